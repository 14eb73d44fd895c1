//! Container - Ordered Named Tensors
//!
//! Provides `Container`, the in-memory form of every on-disk tensor file, and
//! `TensorRecord`, one named tensor inside it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{FormatError, ShapeMismatchError, TensorIndex};

// =============================================================================
// DType
// =============================================================================

/// Element type of a stored tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE float, little-endian.
    F32,
    /// Signed 8-bit integer with a per-tensor scale.
    I8,
}

impl DType {
    /// Tag byte used by the typed variant.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            DType::F32 => 0,
            DType::I8 => 1,
        }
    }

    /// Parses a tag byte.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::I8),
            _ => None,
        }
    }

    /// Bytes per element.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::I8 => 1,
        }
    }

    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::I8 => "i8",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// TensorData
// =============================================================================

/// Element buffer of a tensor. The scale exists only for INT8 data.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// Float32 values.
    Float32(Vec<f32>),
    /// Symmetric INT8 values; `x ≈ q * scale`.
    Int8 {
        /// Quantized values.
        values: Vec<i8>,
        /// Dequantization scale.
        scale: f32,
    },
}

impl TensorData {
    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Float32(_) => DType::F32,
            TensorData::Int8 { .. } => DType::I8,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float32(v) => v.len(),
            TensorData::Int8 { values, .. } => values.len(),
        }
    }

    /// True when there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Quantization scale, present iff the data is INT8.
    #[must_use]
    pub fn scale(&self) -> Option<f32> {
        match self {
            TensorData::Float32(_) => None,
            TensorData::Int8 { scale, .. } => Some(*scale),
        }
    }

    /// Size of the raw data block in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype().size()
    }

    /// Appends the raw little-endian data block.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        match self {
            TensorData::Float32(v) => {
                out.reserve(v.len() * 4);
                for x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
            TensorData::Int8 { values, .. } => {
                out.extend(values.iter().map(|&q| q as u8));
            }
        }
    }
}

// =============================================================================
// TensorRecord
// =============================================================================

/// Element count of a shape, `None` on overflow.
#[must_use]
pub fn shape_numel(shape: &[u32]) -> Option<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
}

/// One named tensor.
///
/// The element count always equals `product(shape)`; `new` is the only way in.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorRecord {
    key: String,
    shape: Vec<u32>,
    data: TensorData,
}

impl TensorRecord {
    /// Creates a record, checking the element count against the shape.
    pub fn new(
        key: impl Into<String>,
        shape: Vec<u32>,
        data: TensorData,
    ) -> Result<Self, ShapeMismatchError> {
        let key = key.into();
        let expected = shape_numel(&shape).unwrap_or(usize::MAX);
        if expected != data.len() {
            return Err(ShapeMismatchError::DataLength {
                key,
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { key, shape, data })
    }

    /// Float32 record.
    pub fn float32(
        key: impl Into<String>,
        shape: Vec<u32>,
        values: Vec<f32>,
    ) -> Result<Self, ShapeMismatchError> {
        Self::new(key, shape, TensorData::Float32(values))
    }

    /// INT8 record with its scale.
    pub fn int8(
        key: impl Into<String>,
        shape: Vec<u32>,
        values: Vec<i8>,
        scale: f32,
    ) -> Result<Self, ShapeMismatchError> {
        Self::new(key, shape, TensorData::Int8 { values, scale })
    }

    /// Tensor key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Declared shape.
    #[must_use]
    pub fn shape(&self) -> &[u32] {
        &self.shape
    }

    /// Element data.
    #[must_use]
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// INT8 scale, if any.
    #[must_use]
    pub fn scale(&self) -> Option<f32> {
        self.data.scale()
    }

    /// Number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// True when the key ends with `suffix` (e.g. `.weight`).
    #[must_use]
    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.key.ends_with(suffix)
    }

    /// Shape as `[OC, IC, KH, KW]`, or an error when not 4-D.
    pub fn conv_dims(&self) -> Result<[usize; 4], ShapeMismatchError> {
        match self.shape.as_slice() {
            &[oc, ic, kh, kw] => Ok([oc as usize, ic as usize, kh as usize, kw as usize]),
            _ => Err(ShapeMismatchError::NotFourDimensional {
                key: self.key.clone(),
                shape: self.shape.clone(),
            }),
        }
    }

    /// Splits into key, shape and data.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<u32>, TensorData) {
        (self.key, self.shape, self.data)
    }
}

// =============================================================================
// Container
// =============================================================================

/// Ordered collection of uniquely-keyed tensors.
///
/// Insertion order is file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    records: Vec<TensorRecord>,
    index: HashMap<String, usize>,
}

impl Container {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container, rejecting duplicate keys.
    pub fn from_records(
        records: impl IntoIterator<Item = TensorRecord>,
    ) -> Result<Self, FormatError> {
        let mut container = Self::new();
        for record in records {
            container.push(record)?;
        }
        Ok(container)
    }

    /// Appends a record. Fails if the key is already present.
    pub fn push(&mut self, record: TensorRecord) -> Result<(), FormatError> {
        let position = self.records.len();
        if self.index.contains_key(record.key()) {
            return Err(FormatError::DuplicateKey {
                tensor: TensorIndex::At(position),
                key: record.key().to_string(),
            });
        }
        self.index.insert(record.key().to_string(), position);
        self.records.push(record);
        Ok(())
    }

    /// Get a record by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TensorRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    /// Check if the container holds a key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in file order.
    pub fn iter(&self) -> impl Iterator<Item = &TensorRecord> {
        self.records.iter()
    }

    /// Records as a slice.
    #[must_use]
    pub fn records(&self) -> &[TensorRecord] {
        &self.records
    }

    /// Keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(TensorRecord::key)
    }

    /// Consumes the container.
    #[must_use]
    pub fn into_records(self) -> Vec<TensorRecord> {
        self.records
    }

    /// Total number of elements.
    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.records.iter().map(TensorRecord::numel).sum()
    }

    /// Total size of all data blocks in bytes.
    #[must_use]
    pub fn data_bytes(&self) -> usize {
        self.records.iter().map(|r| r.data().byte_len()).sum()
    }

    /// Number of INT8 records.
    #[must_use]
    pub fn int8_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.dtype() == DType::I8)
            .count()
    }

    /// Multi-line summary of the container.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Container with {} tensors:", self.len()));
        lines.push(format!("  Total elements: {}", self.total_elements()));
        lines.push(format!("  Data size: {} bytes", self.data_bytes()));
        for record in &self.records {
            let scale = record
                .scale()
                .map(|s| format!(", scale: {s:.6e}"))
                .unwrap_or_default();
            lines.push(format!(
                "    {} - shape: {:?}, dtype: {}{}",
                record.key(),
                record.shape(),
                record.dtype(),
                scale
            ));
        }
        lines.join("\n")
    }
}

impl<'a> IntoIterator for &'a Container {
    type Item = &'a TensorRecord;
    type IntoIter = std::slice::Iter<'a, TensorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
