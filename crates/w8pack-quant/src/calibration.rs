//! Requantization Calibration
//!
//! Derives the per-layer constants the accelerator uses to bring INT32
//! accumulators back to activation range. Two independent outputs exist:
//!
//! - **multiplier**: `round(scale * 65536)` in Q0.16, consumed as
//!   `out = (acc * multiplier + 32768) >> 16`
//! - **shift**: `round(log2(1 / scale))` clamped to `[0, 16]`
//!
//! Layers whose weight is missing, or whose scale is not a positive finite
//! number, fall back to `scale = 1/1024` and are flagged.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use std::collections::HashMap;

use serde::Serialize;
use w8pack_serialize::{find_record, normalize_key, Container, TensorData, TensorRecord};

use crate::error::{QuantError, QuantResult};
use crate::layers::{LayerRole, LayerTable};
use crate::quantize::symmetric_scale;

// =============================================================================
// Constants
// =============================================================================

/// Scale substituted for unusable layers.
pub const FALLBACK_SCALE: f32 = 1.0 / 1024.0;

/// Multiplier of the fallback scale.
pub const FALLBACK_MULTIPLIER: u32 = 64;

/// Shift of the fallback scale.
pub const FALLBACK_SHIFT: u8 = 10;

/// Largest shift the accelerator accepts.
pub const MAX_SHIFT: u8 = 16;

/// One in Q0.16.
const Q16_ONE: f64 = 65536.0;

// =============================================================================
// Calibration Mode
// =============================================================================

/// Which constant to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMode {
    /// Q0.16 fixed-point multiplier.
    Multiplier,
    /// Power-of-two shift.
    Shift,
}

impl CalibrationMode {
    /// Lowercase mode name.
    pub fn name(self) -> &'static str {
        match self {
            CalibrationMode::Multiplier => "multiplier",
            CalibrationMode::Shift => "shift",
        }
    }

    /// Prefix of the generated constant names.
    pub fn constant_prefix(self) -> &'static str {
        match self {
            CalibrationMode::Multiplier => "LAYER_MULTIPLIER",
            CalibrationMode::Shift => "LAYER_SHIFT",
        }
    }

    /// Value used for fallback layers.
    pub fn fallback_value(self) -> CalibratedValue {
        match self {
            CalibrationMode::Multiplier => CalibratedValue::Multiplier(FALLBACK_MULTIPLIER),
            CalibrationMode::Shift => CalibratedValue::Shift(FALLBACK_SHIFT),
        }
    }

    /// Derives the constant for a valid scale.
    pub fn derive(self, scale: f64) -> CalibratedValue {
        match self {
            CalibrationMode::Multiplier => CalibratedValue::Multiplier(multiplier_for_scale(scale)),
            CalibrationMode::Shift => CalibratedValue::Shift(shift_for_scale(scale)),
        }
    }
}

impl std::fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A derived constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibratedValue {
    /// Q0.16 multiplier.
    Multiplier(u32),
    /// Right shift.
    Shift(u8),
}

impl CalibratedValue {
    /// Numeric value.
    pub fn as_u32(self) -> u32 {
        match self {
            CalibratedValue::Multiplier(m) => m,
            CalibratedValue::Shift(s) => u32::from(s),
        }
    }
}

impl std::fmt::Display for CalibratedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// `round(scale * 65536)` clamped to `[1, u32::MAX]`.
pub fn multiplier_for_scale(scale: f64) -> u32 {
    (scale * Q16_ONE)
        .round_ties_even()
        .clamp(1.0, f64::from(u32::MAX)) as u32
}

/// `round(log2(1 / scale))` clamped to `[0, 16]`.
pub fn shift_for_scale(scale: f64) -> u8 {
    (1.0 / scale)
        .log2()
        .round_ties_even()
        .clamp(0.0, f64::from(MAX_SHIFT)) as u8
}

// =============================================================================
// Calibration Entries
// =============================================================================

/// Why a layer used the fallback scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Weight key not in the container.
    MissingKey,
    /// Scale was zero, negative or not finite.
    InvalidScale,
}

/// Calibration result for one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationEntry {
    /// Layer index.
    pub layer: usize,
    /// Representative weight key.
    pub key: String,
    /// Layer role.
    pub role: LayerRole,
    /// Scale the value was derived from.
    pub scale: f32,
    /// Derived constant.
    pub value: CalibratedValue,
    /// True when the fallback constant was substituted.
    pub used_fallback: bool,
    /// Why the fallback was substituted.
    pub fallback: Option<FallbackReason>,
}

/// Per-layer constants for one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationTable {
    /// Derived constant kind.
    pub mode: CalibrationMode,
    /// Description of the scale source.
    pub source: String,
    /// Entries in layer order.
    pub entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    /// Number of fallback entries.
    pub fn fallback_count(&self) -> usize {
        self.entries.iter().filter(|e| e.used_fallback).count()
    }

    /// Number of distinct values.
    pub fn distinct_values(&self) -> usize {
        let mut values: Vec<u32> = self.entries.iter().map(|e| e.value.as_u32()).collect();
        values.sort_unstable();
        values.dedup();
        values.len()
    }

    /// True when every entry carries the fallback value.
    pub fn is_degenerate(&self) -> bool {
        let fallback = self.mode.fallback_value();
        !self.entries.is_empty() && self.entries.iter().all(|e| e.value == fallback)
    }

    /// Fails with `DegenerateCalibration` when every entry is the default.
    pub fn check_degenerate(&self) -> QuantResult<()> {
        if self.is_degenerate() {
            return Err(QuantError::DegenerateCalibration {
                layers: self.entries.len(),
                mode: self.mode.name(),
                value: self.mode.fallback_value().as_u32(),
            });
        }
        Ok(())
    }

    /// Recovered problems: one `MissingLayer` per missing key, then the
    /// degenerate-run diagnostic if it applies.
    pub fn diagnostics(&self) -> Vec<QuantError> {
        let mut out: Vec<QuantError> = self
            .entries
            .iter()
            .filter(|e| e.fallback == Some(FallbackReason::MissingKey))
            .map(|e| QuantError::MissingLayer {
                index: e.layer,
                key: e.key.clone(),
            })
            .collect();
        if let Err(e) = self.check_degenerate() {
            out.push(e);
        }
        out
    }

    /// `NAME_<index> = <value>` lines.
    pub fn render_assignments(&self) -> String {
        let prefix = self.mode.constant_prefix();
        self.entries
            .iter()
            .map(|entry| format!("{prefix}_{} = {}\n", entry.layer, entry.value))
            .collect()
    }

    /// C header with one `#define` per layer.
    pub fn render_c_header(&self) -> String {
        let prefix = self.mode.constant_prefix();
        let (formula, suffix) = match self.mode {
            CalibrationMode::Multiplier => (
                "Multiplier = Scale_W * 65536 (Q0.16). Requant: out = (acc * multiplier + 32768) >> 16",
                "U",
            ),
            CalibrationMode::Shift => ("Shift = round(log2(1 / Scale_W)), clamped to [0, 16]", ""),
        };

        let mut lines = vec![
            "/**".to_string(),
            " * Per-layer requantization constants.".to_string(),
            " *".to_string(),
            format!(" * {formula}"),
            format!(" * Source: {}", self.source),
            " */".to_string(),
            "#ifndef LAYERS_CONFIG_H".to_string(),
            "#define LAYERS_CONFIG_H".to_string(),
            String::new(),
            "#include <stdint.h>".to_string(),
            String::new(),
        ];
        lines.extend(
            self.entries
                .iter()
                .map(|entry| format!("#define {prefix}_{}   {}{suffix}", entry.layer, entry.value)),
        );
        lines.push(String::new());
        lines.push("#endif /* LAYERS_CONFIG_H */".to_string());
        lines.push(String::new());
        lines.join("\n")
    }
}

// =============================================================================
// Calibration
// =============================================================================

/// Scale of a weight record: stored scale for INT8, derived scale for float.
pub fn record_scale(record: &TensorRecord) -> f64 {
    match record.data() {
        TensorData::Int8 { scale, .. } => f64::from(*scale),
        TensorData::Float32(values) => symmetric_scale(values),
    }
}

/// Calibrates every layer of `table` against a float or typed container.
///
/// Never fails: unusable layers fall back and are flagged. Use
/// [`CalibrationTable::check_degenerate`] to reject degenerate runs.
pub fn calibrate(
    container: &Container,
    table: &LayerTable,
    mode: CalibrationMode,
    source: impl Into<String>,
) -> CalibrationTable {
    let prefix = table.key_prefix.as_str();

    // Normalized-key index for exports whose prefix nesting differs from the table
    let normalized: HashMap<String, &TensorRecord> = container
        .iter()
        .filter(|r| r.has_suffix(&table.weight_suffix))
        .map(|r| (normalize_key(r.key(), prefix), r))
        .collect();

    let mut scales: HashMap<&str, Option<f64>> = HashMap::new();
    let mut entries = Vec::with_capacity(table.len());

    for (layer, entry) in table.iter() {
        let scale = *scales.entry(entry.key.as_str()).or_insert_with(|| {
            find_record(container, &entry.key, prefix)
                .or_else(|| normalized.get(&normalize_key(&entry.key, prefix)).copied())
                .map(record_scale)
        });

        let (scale, value, fallback) = match scale {
            None => {
                tracing::warn!(layer, key = %entry.key, "weight key not found, using fallback");
                (FALLBACK_SCALE, mode.fallback_value(), Some(FallbackReason::MissingKey))
            }
            Some(s) if !(s.is_finite() && s > 0.0) => {
                tracing::warn!(layer, key = %entry.key, scale = s, "invalid scale, using fallback");
                (FALLBACK_SCALE, mode.fallback_value(), Some(FallbackReason::InvalidScale))
            }
            Some(s) => (s as f32, mode.derive(s), None),
        };

        tracing::debug!(layer, key = %entry.key, scale, value = %value, "calibrated");
        entries.push(CalibrationEntry {
            layer,
            key: entry.key.clone(),
            role: entry.role,
            scale,
            value,
            used_fallback: fallback.is_some(),
            fallback,
        });
    }

    let result = CalibrationTable {
        mode,
        source: source.into(),
        entries,
    };

    if result.is_degenerate() {
        tracing::warn!(
            layers = result.entries.len(),
            mode = %mode,
            "all layers use the default value; the source likely lacks per-layer scales"
        );
    } else {
        tracing::info!(
            layers = result.entries.len(),
            distinct = result.distinct_values(),
            fallbacks = result.fallback_count(),
            "calibrated layers"
        );
    }
    result
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerEntry;

    fn table(keys: &[&str]) -> LayerTable {
        LayerTable {
            layers: keys
                .iter()
                .map(|k| LayerEntry {
                    key: (*k).to_string(),
                    role: LayerRole::Conv,
                })
                .collect(),
            ..LayerTable::yolov5n()
        }
    }

    #[test]
    fn test_multiplier_derivation() {
        assert_eq!(multiplier_for_scale(0.01), 655);
        assert_eq!(multiplier_for_scale(f64::from(0.01f32)), 655);
        assert_eq!(multiplier_for_scale(1.0 / 1024.0), 64);
        assert_eq!(multiplier_for_scale(1e-9), 1);
        assert_eq!(multiplier_for_scale(1e9), u32::MAX);
    }

    #[test]
    fn test_shift_derivation() {
        assert_eq!(shift_for_scale(1.0 / 1024.0), 10);
        assert_eq!(shift_for_scale(0.01), 7);
        assert_eq!(shift_for_scale(4.0), 0);
        assert_eq!(shift_for_scale(1e-9), 16);
    }

    #[test]
    fn test_calibrate_typed_container() {
        let container = Container::from_records(vec![
            TensorRecord::int8("model.0.conv.weight", vec![1], vec![1], 0.01).unwrap(),
            TensorRecord::int8("model.1.conv.weight", vec![1], vec![1], 0.02).unwrap(),
        ])
        .unwrap();

        let result = calibrate(
            &container,
            &table(&["model.0.conv.weight", "model.1.conv.weight", "model.0.conv.weight"]),
            CalibrationMode::Multiplier,
            "test",
        );
        let values: Vec<u32> = result.entries.iter().map(|e| e.value.as_u32()).collect();
        assert_eq!(values, vec![655, 1311, 655]);
        assert_eq!(result.fallback_count(), 0);
        assert!(!result.is_degenerate());
        assert!(result.diagnostics().is_empty());
    }

    #[test]
    fn test_calibrate_float_container_uses_derived_scale() {
        let container = Container::from_records(vec![TensorRecord::float32(
            "model.0.conv.weight",
            vec![2],
            vec![1.27, -0.5],
        )
        .unwrap()])
        .unwrap();

        let result = calibrate(
            &container,
            &table(&["model.0.conv.weight"]),
            CalibrationMode::Multiplier,
            "test",
        );
        assert_eq!(result.entries[0].value, CalibratedValue::Multiplier(655));
    }

    #[test]
    fn test_missing_key_falls_back() {
        let container = Container::from_records(vec![
            TensorRecord::int8("model.0.conv.weight", vec![1], vec![1], 0.01).unwrap(),
        ])
        .unwrap();

        let result = calibrate(
            &container,
            &table(&["model.0.conv.weight", "model.9.conv.weight"]),
            CalibrationMode::Shift,
            "test",
        );
        let missing = &result.entries[1];
        assert_eq!(missing.value, CalibratedValue::Shift(10));
        assert_eq!(missing.scale, FALLBACK_SCALE);
        assert_eq!(missing.fallback, Some(FallbackReason::MissingKey));

        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            QuantError::MissingLayer { index: 1, key } if key == "model.9.conv.weight"
        ));
    }

    #[test]
    fn test_invalid_scale_falls_back() {
        let container = Container::from_records(vec![
            TensorRecord::int8("model.0.conv.weight", vec![1], vec![1], 0.0).unwrap(),
            TensorRecord::int8("model.1.conv.weight", vec![1], vec![1], f32::NAN).unwrap(),
        ])
        .unwrap();

        let result = calibrate(
            &container,
            &table(&["model.0.conv.weight", "model.1.conv.weight"]),
            CalibrationMode::Multiplier,
            "test",
        );
        assert!(result
            .entries
            .iter()
            .all(|e| e.fallback == Some(FallbackReason::InvalidScale)));
    }

    #[test]
    fn test_degenerate_run() {
        let result = calibrate(
            &Container::new(),
            &LayerTable::yolov5n(),
            CalibrationMode::Multiplier,
            "empty",
        );
        assert_eq!(result.entries.len(), 25);
        assert!(result.is_degenerate());
        assert!(matches!(
            result.check_degenerate(),
            Err(QuantError::DegenerateCalibration { layers: 25, value: 64, .. })
        ));
        assert_eq!(result.diagnostics().len(), 26);
    }

    #[test]
    fn test_nested_prefix_lookup() {
        let container = Container::from_records(vec![
            TensorRecord::int8("model.model.0.conv.weight", vec![1], vec![1], 0.01).unwrap(),
            TensorRecord::int8("model.model.model.1.conv.weight", vec![1], vec![1], 0.01).unwrap(),
        ])
        .unwrap();

        let result = calibrate(
            &container,
            &table(&["model.0.conv.weight", "model.1.conv.weight"]),
            CalibrationMode::Multiplier,
            "test",
        );
        assert_eq!(result.fallback_count(), 0);
    }

    #[test]
    fn test_render_assignments() {
        let container = Container::from_records(vec![
            TensorRecord::int8("model.0.conv.weight", vec![1], vec![1], 0.01).unwrap(),
        ])
        .unwrap();
        let result = calibrate(
            &container,
            &table(&["model.0.conv.weight", "model.5.conv.weight"]),
            CalibrationMode::Multiplier,
            "test",
        );
        assert_eq!(
            result.render_assignments(),
            "LAYER_MULTIPLIER_0 = 655\nLAYER_MULTIPLIER_1 = 64\n"
        );
    }

    #[test]
    fn test_render_c_header() {
        let container = Container::from_records(vec![
            TensorRecord::int8("model.0.conv.weight", vec![1], vec![1], 1.0 / 1024.0).unwrap(),
        ])
        .unwrap();

        let multipliers = calibrate(
            &container,
            &table(&["model.0.conv.weight"]),
            CalibrationMode::Multiplier,
            "weights_w8.bin",
        )
        .render_c_header();
        assert!(multipliers.contains("#ifndef LAYERS_CONFIG_H"));
        assert!(multipliers.contains("#define LAYER_MULTIPLIER_0   64U\n"));
        assert!(multipliers.contains(" * Source: weights_w8.bin"));
        assert!(multipliers.starts_with("/**\n * Per-layer requantization constants.\n"));
        assert!(multipliers.ends_with("\n#endif /* LAYERS_CONFIG_H */\n"));

        let shifts = calibrate(
            &container,
            &table(&["model.0.conv.weight"]),
            CalibrationMode::Shift,
            "weights_w8.bin",
        )
        .render_c_header();
        assert!(shifts.contains("#define LAYER_SHIFT_0   10\n"));
    }

    #[test]
    fn test_json_report() {
        let result = calibrate(
            &Container::new(),
            &table(&["model.0.conv.weight"]),
            CalibrationMode::Shift,
            "empty",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["mode"], "shift");
        assert_eq!(json["entries"][0]["value"]["shift"], 10);
        assert_eq!(json["entries"][0]["used_fallback"], true);
        assert_eq!(json["entries"][0]["fallback"], "missing_key");
    }
}
