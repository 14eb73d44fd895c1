//! Layer Weight Table
//!
//! Maps each logical layer index of the accelerator's network schedule to the
//! container key whose scale configures that layer. Upsample and concat layers
//! reuse the scale of a neighbouring convolution, so keys may repeat.
//!
//! The table must follow the consumer's own layer numbering. It is versioned
//! and can be loaded from TOML:
//!
//! ```toml
//! version = 1
//! name = "yolov5n"
//! weight_suffix = ".weight"
//! key_prefix = "model."
//!
//! [[layers]]
//! key = "model.0.conv.weight"
//!
//! [[layers]]
//! key = "model.10.conv.weight"
//! role = "upsample"
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuantError, QuantResult};
use crate::types::DEFAULT_WEIGHT_SUFFIX;

/// Schema version this build reads and writes.
pub const LAYER_TABLE_VERSION: u32 = 1;

// =============================================================================
// Layer Role
// =============================================================================

/// What a scheduled layer does on the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerRole {
    /// Convolution with its own weight.
    #[default]
    Conv,
    /// Upsample, reuses the preceding convolution's scale.
    Upsample,
    /// Concatenation, reuses a neighbouring convolution's scale.
    Concat,
    /// Detection head convolution.
    Detect,
}

impl LayerRole {
    /// True when the layer borrows another layer's weight key.
    pub fn is_alias(self) -> bool {
        matches!(self, LayerRole::Upsample | LayerRole::Concat)
    }
}

// =============================================================================
// Layer Table
// =============================================================================

/// One scheduled layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEntry {
    /// Representative weight key.
    pub key: String,
    /// Layer role.
    #[serde(default)]
    pub role: LayerRole,
}

impl LayerEntry {
    fn new(key: &str, role: LayerRole) -> Self {
        Self {
            key: key.to_string(),
            role,
        }
    }
}

/// Versioned layer index to weight key mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTable {
    /// Schema version.
    pub version: u32,
    /// Network name.
    #[serde(default)]
    pub name: String,
    /// Suffix marking quantizable weights.
    #[serde(default = "default_weight_suffix")]
    pub weight_suffix: String,
    /// Module prefix exporters may repeat (`model.model.`).
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Layers in schedule order; the position is the layer index.
    pub layers: Vec<LayerEntry>,
}

fn default_weight_suffix() -> String {
    DEFAULT_WEIGHT_SUFFIX.to_string()
}

fn default_key_prefix() -> String {
    "model.".to_string()
}

impl Default for LayerTable {
    fn default() -> Self {
        Self::yolov5n()
    }
}

impl LayerTable {
    /// The 25-layer YOLOv5n schedule of the W8A16 accelerator build.
    pub fn yolov5n() -> Self {
        use LayerRole::{Concat, Conv, Detect, Upsample};

        let layers = vec![
            LayerEntry::new("model.0.conv.weight", Conv),
            LayerEntry::new("model.1.conv.weight", Conv),
            LayerEntry::new("model.2.cv1.conv.weight", Conv),
            LayerEntry::new("model.3.conv.weight", Conv),
            LayerEntry::new("model.4.cv1.conv.weight", Conv),
            LayerEntry::new("model.5.conv.weight", Conv),
            LayerEntry::new("model.6.cv1.conv.weight", Conv),
            LayerEntry::new("model.7.conv.weight", Conv),
            LayerEntry::new("model.8.cv1.conv.weight", Conv),
            LayerEntry::new("model.9.cv1.conv.weight", Conv),
            LayerEntry::new("model.10.conv.weight", Conv),
            LayerEntry::new("model.10.conv.weight", Upsample),
            LayerEntry::new("model.13.cv1.conv.weight", Concat),
            LayerEntry::new("model.13.cv1.conv.weight", Conv),
            LayerEntry::new("model.14.conv.weight", Conv),
            LayerEntry::new("model.14.conv.weight", Upsample),
            LayerEntry::new("model.17.cv1.conv.weight", Concat),
            LayerEntry::new("model.17.cv1.conv.weight", Conv),
            LayerEntry::new("model.18.conv.weight", Conv),
            LayerEntry::new("model.18.conv.weight", Concat),
            LayerEntry::new("model.20.cv1.conv.weight", Conv),
            LayerEntry::new("model.21.conv.weight", Conv),
            LayerEntry::new("model.21.conv.weight", Concat),
            LayerEntry::new("model.23.cv1.conv.weight", Conv),
            LayerEntry::new("model.24.m.0.weight", Detect),
        ];

        Self {
            version: LAYER_TABLE_VERSION,
            name: "yolov5n".to_string(),
            weight_suffix: default_weight_suffix(),
            key_prefix: default_key_prefix(),
            layers,
        }
    }

    /// Parses and validates a TOML table.
    pub fn from_toml_str(s: &str) -> QuantResult<Self> {
        let table: Self = toml::from_str(s)?;
        table.validate()?;
        Ok(table)
    }

    /// Loads and validates a TOML table from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> QuantResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| QuantError::TableIo {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), layers = table.len(), "loaded layer table");
        Ok(table)
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> QuantResult<String> {
        toml::to_string_pretty(self).map_err(|e| QuantError::InvalidLayerTable(e.to_string()))
    }

    /// Checks version and content.
    pub fn validate(&self) -> QuantResult<()> {
        if self.version != LAYER_TABLE_VERSION {
            return Err(QuantError::UnsupportedTableVersion {
                found: self.version,
                expected: LAYER_TABLE_VERSION,
            });
        }
        if self.weight_suffix.is_empty() {
            return Err(QuantError::InvalidLayerTable(
                "weight_suffix must not be empty".to_string(),
            ));
        }
        if self.layers.is_empty() {
            return Err(QuantError::InvalidLayerTable("no layers".to_string()));
        }
        if let Some((index, _)) = self
            .layers
            .iter()
            .enumerate()
            .find(|(_, l)| l.key.trim().is_empty())
        {
            return Err(QuantError::InvalidLayerTable(format!(
                "layer {index} has an empty key"
            )));
        }
        if let Some((index, layer)) = self
            .layers
            .iter()
            .enumerate()
            .find(|(_, l)| !l.key.ends_with(&self.weight_suffix))
        {
            return Err(QuantError::InvalidLayerTable(format!(
                "layer {index} key {:?} does not end with {:?}",
                layer.key, self.weight_suffix
            )));
        }
        Ok(())
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True when there are no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Weight key of a layer.
    pub fn key(&self, index: usize) -> Option<&str> {
        self.layers.get(index).map(|l| l.key.as_str())
    }

    /// `(index, entry)` pairs in schedule order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &LayerEntry)> {
        self.layers.iter().enumerate()
    }

    /// Distinct weight keys in first-use order.
    pub fn distinct_keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.layers
            .iter()
            .map(|l| l.key.as_str())
            .filter(|k| seen.insert(*k))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
