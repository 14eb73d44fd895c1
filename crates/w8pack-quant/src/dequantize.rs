//! Dequantization Functions
//!
//! Functions for converting INT8 tensors back to float, `x' = q * scale`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use rayon::prelude::*;
use w8pack_serialize::{Container, TensorData, TensorRecord};

use crate::error::QuantResult;
use crate::types::QuantizedTensor;

// =============================================================================
// Public API
// =============================================================================

/// Dequantizes raw values with their scale.
pub fn dequantize_values(values: &[i8], scale: f32) -> Vec<f32> {
    values.iter().map(|&q| f32::from(q) * scale).collect()
}

/// Dequantizes a quantized tensor back to float values.
pub fn dequantize_tensor(quantized: &QuantizedTensor) -> Vec<f32> {
    dequantize_values(&quantized.values, quantized.scale)
}

/// Converts an INT8 record to a float record; float records are cloned.
pub fn dequantize_record(record: &TensorRecord) -> QuantResult<TensorRecord> {
    match record.data() {
        TensorData::Int8 { values, scale } => Ok(TensorRecord::float32(
            record.key(),
            record.shape().to_vec(),
            dequantize_values(values, *scale),
        )?),
        TensorData::Float32(_) => Ok(record.clone()),
    }
}

/// Dequantizes every INT8 record of a container.
pub fn dequantize_container(container: &Container) -> QuantResult<Container> {
    let records = container
        .records()
        .par_iter()
        .map(dequantize_record)
        .collect::<QuantResult<Vec<_>>>()?;
    Ok(Container::from_records(records)?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::quantize_container;

    #[test]
    fn test_dequantize_values() {
        assert_eq!(dequantize_values(&[2, -4, 0], 0.5), vec![1.0, -2.0, 0.0]);
    }

    #[test]
    fn test_roundtrip_container() {
        let original: Vec<f32> = (0..64).map(|x| x as f32 / 10.0 - 3.0).collect();
        let container = Container::from_records(vec![
            TensorRecord::float32("l.weight", vec![8, 8], original.clone()).unwrap(),
            TensorRecord::float32("l.bias", vec![2], vec![0.5, 1.5]).unwrap(),
        ])
        .unwrap();

        let quantized = quantize_container(&container, ".weight").unwrap();
        let restored = dequantize_container(&quantized).unwrap();

        assert_eq!(restored.int8_count(), 0);
        assert_eq!(restored.get("l.bias"), container.get("l.bias"));

        let w = restored.get("l.weight").unwrap();
        assert_eq!(w.shape(), &[8, 8]);
        let TensorData::Float32(values) = w.data() else {
            panic!("expected float data");
        };
        for (orig, deq) in original.iter().zip(values.iter()) {
            assert!((orig - deq).abs() < 0.02, "INT8 error too large: {} vs {}", orig, deq);
        }
    }
}
