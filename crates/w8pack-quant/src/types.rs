//! Quantization Types
//!
//! Defines the INT8 tensor produced by the symmetric quantizer.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use w8pack_serialize::{TensorData, TensorRecord};

use crate::error::QuantResult;

// =============================================================================
// Constants
// =============================================================================

/// Largest magnitude of a quantized value. The range is symmetric, -128 is never produced.
pub const INT8_MAX: i8 = 127;

/// Lower bound of a per-tensor scale, used for all-zero tensors.
pub const EPSILON: f64 = 1e-8;

/// Key suffix of tensors the quantizer converts.
pub const DEFAULT_WEIGHT_SUFFIX: &str = ".weight";

// =============================================================================
// Quantized Tensor
// =============================================================================

/// A tensor quantized with one symmetric per-tensor scale.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    /// Shape of the original tensor.
    pub shape: Vec<u32>,
    /// Quantized values in `[-127, 127]`.
    pub values: Vec<i8>,
    /// Scale such that `x ~= q * scale`.
    pub scale: f32,
}

impl QuantizedTensor {
    /// Creates a new quantized tensor.
    pub fn new(shape: Vec<u32>, values: Vec<i8>, scale: f32) -> Self {
        Self {
            shape,
            values,
            scale,
        }
    }

    /// Returns the number of elements.
    pub fn numel(&self) -> usize {
        self.values.len()
    }

    /// Returns the stored size in bytes (values plus the scale).
    pub fn size_bytes(&self) -> usize {
        self.values.len() + std::mem::size_of::<f32>()
    }

    /// Returns the compression ratio compared to F32.
    pub fn compression_ratio(&self) -> f32 {
        let original = self.values.len() * std::mem::size_of::<f32>();
        original as f32 / self.size_bytes() as f32
    }

    /// Converts into a typed-container record.
    pub fn into_record(self, key: impl Into<String>) -> QuantResult<TensorRecord> {
        Ok(TensorRecord::int8(key, self.shape, self.values, self.scale)?)
    }

    /// Copies the INT8 payload of a record, if it has one.
    pub fn from_record(record: &TensorRecord) -> Option<Self> {
        match record.data() {
            TensorData::Int8 { values, scale } => Some(Self {
                shape: record.shape().to_vec(),
                values: values.clone(),
                scale: *scale,
            }),
            TensorData::Float32(_) => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
