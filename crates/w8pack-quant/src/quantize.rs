//! Quantization Functions
//!
//! Symmetric per-tensor INT8 quantization of float weights.
//!
//! Arithmetic runs in f64 with round-half-to-even so the scale and bytes agree
//! bit-for-bit with artifacts produced by the existing tool chain. The stored
//! scale is the f64 scale narrowed to f32.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use rayon::prelude::*;
use w8pack_serialize::{Container, TensorData, TensorRecord};

use crate::error::{QuantError, QuantResult};
use crate::types::{QuantizedTensor, EPSILON, INT8_MAX};

// =============================================================================
// Public API
// =============================================================================

/// Per-tensor scale in f64: `max(max_abs / 127, 1e-8)`.
pub fn symmetric_scale(values: &[f32]) -> f64 {
    let max_abs = values
        .iter()
        .map(|x| f64::from(x.abs()))
        .fold(0.0f64, f64::max);
    (max_abs / f64::from(INT8_MAX)).max(EPSILON)
}

/// Quantizes values with one symmetric scale.
///
/// Returns the INT8 values and the f32 scale. Pure: the same input always
/// yields the same bytes.
///
/// # Example
/// ```ignore
/// let (q, scale) = quantize_symmetric(&[127.0, -1.0]);
/// assert_eq!(q, vec![127, -1]);
/// assert_eq!(scale, 1.0);
/// ```
pub fn quantize_symmetric(values: &[f32]) -> (Vec<i8>, f32) {
    let scale = symmetric_scale(values);
    let max = f64::from(INT8_MAX);
    let quantized = values
        .iter()
        .map(|&x| (f64::from(x) / scale).round_ties_even().clamp(-max, max) as i8)
        .collect();
    (quantized, scale as f32)
}

/// Quantizes a float record into a `QuantizedTensor`.
///
/// INT8 records are returned as stored. Fails on NaN/infinite values.
pub fn quantize_tensor(record: &TensorRecord) -> QuantResult<QuantizedTensor> {
    let values = match record.data() {
        TensorData::Float32(values) => values,
        TensorData::Int8 { values, scale } => {
            return Ok(QuantizedTensor::new(
                record.shape().to_vec(),
                values.clone(),
                *scale,
            ))
        }
    };

    if let Some(index) = values.iter().position(|x| !x.is_finite()) {
        return Err(QuantError::NonFiniteWeight {
            key: record.key().to_string(),
            index,
        });
    }

    let (quantized, scale) = quantize_symmetric(values);
    Ok(QuantizedTensor::new(record.shape().to_vec(), quantized, scale))
}

/// Quantizes a record when it is a float weight, otherwise clones it.
pub fn quantize_record(record: &TensorRecord, weight_suffix: &str) -> QuantResult<TensorRecord> {
    if record.dtype() != w8pack_serialize::DType::F32 || !record.has_suffix(weight_suffix) {
        tracing::debug!(key = record.key(), dtype = %record.dtype(), "pass through");
        return Ok(record.clone());
    }

    let quantized = quantize_tensor(record)?;
    tracing::debug!(
        key = record.key(),
        shape = ?record.shape(),
        scale = quantized.scale,
        "quantized"
    );
    quantized.into_record(record.key())
}

/// Quantizes a model (collection of named tensors).
///
/// Weights are processed on the rayon pool; the output keeps input order.
///
/// # Arguments
/// * `container` - Float (or partially quantized) container
/// * `weight_suffix` - Key suffix selecting tensors to quantize
pub fn quantize_container(container: &Container, weight_suffix: &str) -> QuantResult<Container> {
    let records = container
        .records()
        .par_iter()
        .map(|record| quantize_record(record, weight_suffix))
        .collect::<QuantResult<Vec<_>>>()?;

    let output = Container::from_records(records)?;
    tracing::info!(
        tensors = output.len(),
        quantized = output.int8_count(),
        "quantized container"
    );
    Ok(output)
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Computes the quantization error (RMSE) between original and dequantized.
pub fn compute_quantization_error(original: &[f32], dequantized: &[f32]) -> f32 {
    if original.len() != dequantized.len() || original.is_empty() {
        return f32::INFINITY;
    }

    let mse: f32 = original
        .iter()
        .zip(dequantized.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f32>()
        / original.len() as f32;

    mse.sqrt()
}

/// Returns statistics about quantization error.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct QuantizationStats {
    /// Root mean square error.
    pub rmse: f32,
    /// Maximum absolute error.
    pub max_error: f32,
    /// Mean absolute error.
    pub mean_error: f32,
    /// Compression ratio.
    pub compression_ratio: f32,
}

/// Computes detailed quantization statistics.
pub fn compute_quantization_stats(
    original: &[f32],
    quantized: &QuantizedTensor,
) -> QuantizationStats {
    let dequantized = crate::dequantize::dequantize_tensor(quantized);
    let errors: Vec<f32> = original
        .iter()
        .zip(dequantized.iter())
        .map(|(a, b)| (a - b).abs())
        .collect();

    let count = errors.len().max(1) as f32;
    let rmse = if errors.is_empty() {
        0.0
    } else {
        compute_quantization_error(original, &dequantized)
    };
    let max_error = errors.iter().fold(0.0f32, |a, &b| a.max(b));
    let mean_error = errors.iter().sum::<f32>() / count;

    QuantizationStats {
        rmse,
        max_error,
        mean_error,
        compression_ratio: quantized.compression_ratio(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dequantize::dequantize_values;
    use proptest::prelude::*;

    #[test]
    fn test_quantize_exact_scale() {
        let (q, scale) = quantize_symmetric(&[127.0, -1.0, 0.0, 50.0]);
        assert_eq!(scale, 1.0);
        assert_eq!(q, vec![127, -1, 0, 50]);
    }

    #[test]
    fn test_round_half_to_even() {
        let (q, _) = quantize_symmetric(&[127.0, 62.5, 63.5, -0.5, -2.5]);
        assert_eq!(q, vec![127, 62, 64, 0, -2]);
    }

    #[test]
    fn test_all_zero_tensor() {
        let (q, scale) = quantize_symmetric(&[0.0; 8]);
        assert_eq!(q, vec![0; 8]);
        assert_eq!(scale, 1e-8f64 as f32);
    }

    #[test]
    fn test_non_finite_rejected() {
        let record = TensorRecord::float32("m.weight", vec![3], vec![1.0, f32::NAN, 0.0]).unwrap();
        match quantize_tensor(&record) {
            Err(QuantError::NonFiniteWeight { key, index }) => {
                assert_eq!(key, "m.weight");
                assert_eq!(index, 1);
            }
            other => panic!("expected NonFiniteWeight, got {other:?}"),
        }
    }

    #[test]
    fn test_container_passthrough() {
        let container = Container::from_records(vec![
            TensorRecord::float32("a.conv.weight", vec![2], vec![0.25, -1.0]).unwrap(),
            TensorRecord::float32("a.conv.bias", vec![1], vec![0.25]).unwrap(),
            TensorRecord::int8("b.weight", vec![1], vec![7], 0.5).unwrap(),
            TensorRecord::float32("a.bn.running_mean", vec![1], vec![3.0]).unwrap(),
        ])
        .unwrap();

        let out = quantize_container(&container, ".weight").unwrap();
        let keys: Vec<_> = out.keys().collect();
        assert_eq!(
            keys,
            vec!["a.conv.weight", "a.conv.bias", "b.weight", "a.bn.running_mean"]
        );
        assert_eq!(out.int8_count(), 2);
        assert_eq!(out.get("a.conv.bias"), container.get("a.conv.bias"));
        assert_eq!(out.get("b.weight"), container.get("b.weight"));
        assert_eq!(out.get("a.bn.running_mean"), container.get("a.bn.running_mean"));

        let w = out.get("a.conv.weight").unwrap();
        assert_eq!(
            w.data(),
            &TensorData::Int8 {
                values: vec![32, -127],
                scale: (1.0f64 / 127.0) as f32
            }
        );
    }

    #[test]
    fn test_container_deterministic() {
        let records = (0..16)
            .map(|i| {
                let values = (0..50).map(|j| ((i * 50 + j) as f32).sin()).collect();
                TensorRecord::float32(format!("m.{i}.weight"), vec![50], values).unwrap()
            })
            .collect::<Vec<_>>();
        let container = Container::from_records(records).unwrap();

        let a = quantize_container(&container, ".weight").unwrap();
        let b = quantize_container(&container, ".weight").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_quantization_error() {
        let original = vec![1.0, 2.0, 3.0, 4.0];
        let dequantized = vec![1.1, 2.0, 2.9, 4.1];

        let rmse = compute_quantization_error(&original, &dequantized);
        assert!(rmse > 0.0);
        assert!(rmse < 0.2);
        assert!(compute_quantization_error(&original, &[1.0]).is_infinite());
    }

    #[test]
    fn test_quantization_stats() {
        let original = vec![0.1, -0.5, 0.33, 1.0];
        let record = TensorRecord::float32("w.weight", vec![4], original.clone()).unwrap();
        let q = quantize_tensor(&record).unwrap();
        let stats = compute_quantization_stats(&original, &q);
        assert!(stats.max_error <= q.scale / 2.0 + 1e-6);
        assert!(stats.mean_error <= stats.max_error);
        assert!(stats.rmse <= stats.max_error + 1e-6);
        assert_eq!(
            stats.rmse,
            compute_quantization_error(&original, &crate::dequantize::dequantize_tensor(&q))
        );
    }

    proptest! {
        #[test]
        fn prop_values_in_range(values in prop::collection::vec(-1e4f32..1e4f32, 1..256)) {
            let (q, scale) = quantize_symmetric(&values);
            prop_assert!(scale >= 1e-8);
            prop_assert!(q.iter().all(|&v| (-127..=127).contains(&v)));
        }

        #[test]
        fn prop_error_within_half_step(values in prop::collection::vec(-100f32..100f32, 1..256)) {
            let (q, scale) = quantize_symmetric(&values);
            let restored = dequantize_values(&q, scale);
            let tolerance = scale / 2.0 + scale * 1e-4 + 1e-6;
            for (x, y) in values.iter().zip(restored.iter()) {
                prop_assert!((x - y).abs() <= tolerance, "{} vs {} (scale {})", x, y, scale);
            }
        }
    }
}
