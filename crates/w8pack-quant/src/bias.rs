//! Bias Quantization
//!
//! Converts float conv biases to the INT32 fixed-point form the accelerator
//! adds to its accumulators: `bias_q = roundf(bias * 1024 / weight_scale)`,
//! zero-padded to a whole 32-channel block.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use w8pack_serialize::{paired_bias_key, Container, RepackedContainer, ShapeMismatchError};

use crate::dequantize::dequantize_record;
use crate::error::QuantResult;
use crate::quantize::quantize_tensor;
use crate::repack::{is_repack_eligible, OC_BLOCK};

/// Fixed-point factor of the accumulator bias.
pub const BIAS_FRACTION: f32 = 1024.0;

/// Quantizes a bias vector against its weight's scale.
///
/// The result is padded with zeros to a multiple of 32 entries. A non-positive
/// scale yields all zeros.
pub fn quantize_bias(bias: &[f32], weight_scale: f32) -> Vec<i32> {
    let padded = bias.len().div_ceil(OC_BLOCK).max(1) * OC_BLOCK;
    let mut out = vec![0i32; padded];
    if weight_scale <= 0.0 {
        return out;
    }

    let factor = BIAS_FRACTION / weight_scale;
    for (slot, &b) in out.iter_mut().zip(bias) {
        // f32::round rounds half away from zero
        *slot = (b * factor).round() as i32;
    }
    out
}

/// Little-endian bytes of a quantized bias.
pub fn bias_blob(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Quantizes the bias paired with every repackable weight.
///
/// Weights without a bias are skipped. The output is keyed by bias key.
pub fn repack_biases(container: &Container, weight_suffix: &str) -> QuantResult<RepackedContainer> {
    let mut output = RepackedContainer::new();

    for weight in container.iter().filter(|r| is_repack_eligible(r, weight_suffix)) {
        let Some(bias_key) = paired_bias_key(weight.key(), weight_suffix) else {
            continue;
        };
        let Some(bias) = container.get(&bias_key) else {
            tracing::debug!(weight = weight.key(), "no bias");
            continue;
        };

        let [oc, ..] = weight.conv_dims()?;
        if bias.numel() != oc {
            return Err(ShapeMismatchError::DataLength {
                key: bias_key,
                shape: bias.shape().to_vec(),
                expected: oc,
                actual: bias.numel(),
            }
            .into());
        }

        let scale = quantize_tensor(weight)?.scale;
        let bias = dequantize_record(bias)?;
        let w8pack_serialize::TensorData::Float32(values) = bias.data() else {
            continue;
        };
        let quantized = quantize_bias(values, scale);
        output.push(bias_key, bias_blob(&quantized))?;
    }

    tracing::info!(biases = output.len(), "quantized biases");
    Ok(output)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use w8pack_serialize::TensorRecord;

    #[test]
    fn test_quantize_bias() {
        let q = quantize_bias(&[0.5, -0.25, 0.0], 0.5);
        assert_eq!(q.len(), 32);
        assert_eq!(&q[..3], &[1024, -512, 0]);
        assert!(q[3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_quantize_bias_rounds_half_away_from_zero() {
        // 2.5 after scaling, rounds to 3
        let q = quantize_bias(&[2.5 / 1024.0, -2.5 / 1024.0], 1.0);
        assert_eq!(&q[..2], &[3, -3]);
    }

    #[test]
    fn test_quantize_bias_bad_scale() {
        assert!(quantize_bias(&[1.0; 40], 0.0).iter().all(|&v| v == 0));
        assert_eq!(quantize_bias(&[1.0; 40], -1.0).len(), 64);
    }

    #[test]
    fn test_repack_biases() {
        let container = Container::from_records(vec![
            TensorRecord::int8("m.0.conv.weight", vec![2, 1, 1, 1], vec![127, -64], 0.5).unwrap(),
            TensorRecord::float32("m.0.conv.bias", vec![2], vec![0.5, -1.0]).unwrap(),
            TensorRecord::int8("m.1.conv.weight", vec![1, 1, 1, 1], vec![1], 0.5).unwrap(),
        ])
        .unwrap();

        let out = repack_biases(&container, ".weight").unwrap();
        assert_eq!(out.len(), 1);
        let blob = out.get("m.0.conv.bias").unwrap();
        assert_eq!(blob.len(), 32 * 4);
        assert_eq!(&blob[..4], &1024i32.to_le_bytes());
        assert_eq!(&blob[4..8], &(-2048i32).to_le_bytes());
    }

    #[test]
    fn test_bias_length_mismatch() {
        let container = Container::from_records(vec![
            TensorRecord::int8("m.0.conv.weight", vec![2, 1, 1, 1], vec![1, 1], 0.5).unwrap(),
            TensorRecord::float32("m.0.conv.bias", vec![3], vec![0.0; 3]).unwrap(),
        ])
        .unwrap();
        assert!(repack_biases(&container, ".weight").is_err());
    }
}
