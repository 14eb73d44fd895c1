//! Serialization Error Types
//!
//! Error types for reading and writing tensor containers.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::path::PathBuf;

use thiserror::Error;

/// Result type for container I/O.
pub type SerializeResult<T> = Result<T, SerializeError>;

/// Malformed container bytes.
///
/// Always fatal. Every variant carries the index of the offending tensor so the
/// report points at the exact record inside the file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A read ran past the end of the buffer.
    #[error("tensor {tensor}: truncated {field} (need {needed} bytes at offset {offset}, {available} available)")]
    Truncated {
        /// Tensor index (`None` for the container header).
        tensor: TensorIndex,
        /// Name of the field being read.
        field: &'static str,
        /// Byte offset of the read.
        offset: usize,
        /// Bytes required by the read.
        needed: usize,
        /// Bytes remaining in the buffer.
        available: usize,
    },

    /// Key length prefix exceeds the format limit.
    #[error("tensor {tensor}: invalid key length {len} (max {max})")]
    InvalidKeyLength {
        /// Tensor index.
        tensor: TensorIndex,
        /// Declared key length.
        len: usize,
        /// Format limit.
        max: usize,
    },

    /// Key bytes are not valid UTF-8.
    #[error("tensor {tensor}: key is not valid UTF-8")]
    InvalidKey {
        /// Tensor index.
        tensor: TensorIndex,
    },

    /// Rank exceeds the format limit, or the element count overflows.
    #[error("tensor {tensor} ({key}): invalid shape: {reason}")]
    InvalidShape {
        /// Tensor index.
        tensor: TensorIndex,
        /// Tensor key.
        key: String,
        /// What is wrong with the shape.
        reason: String,
    },

    /// Unknown dtype tag in the typed variant.
    #[error("tensor {tensor} ({key}): unknown dtype tag {tag}")]
    InvalidDtype {
        /// Tensor index.
        tensor: TensorIndex,
        /// Tensor key.
        key: String,
        /// Raw tag byte.
        tag: u8,
    },

    /// Dtype cannot be stored in the requested variant.
    #[error("tensor {tensor} ({key}): dtype {dtype} cannot be written as the {format} variant")]
    UnsupportedDtype {
        /// Tensor index.
        tensor: TensorIndex,
        /// Tensor key.
        key: String,
        /// Dtype name.
        dtype: &'static str,
        /// Variant name.
        format: &'static str,
    },

    /// The same key appears twice.
    #[error("tensor {tensor}: duplicate key {key:?}")]
    DuplicateKey {
        /// Tensor index of the second occurrence.
        tensor: TensorIndex,
        /// Repeated key.
        key: String,
    },

    /// The variant has no tensor metadata and cannot decode into a `Container`.
    #[error("the {format} variant carries no shape/dtype metadata")]
    NoMetadata {
        /// Variant name.
        format: &'static str,
    },

    /// A count or length does not fit the 32-bit length prefix.
    #[error("{what} {value} does not fit in a u32 length prefix")]
    LengthOverflow {
        /// What was being written.
        what: &'static str,
        /// Offending value.
        value: usize,
    },
}

/// Tensor position used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorIndex {
    /// The container header, before any tensor.
    Header,
    /// Tensor at this position.
    At(usize),
}

impl std::fmt::Display for TensorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorIndex::Header => write!(f, "header"),
            TensorIndex::At(i) => write!(f, "#{i}"),
        }
    }
}

/// Declared shape disagrees with the data, or the shape is unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeMismatchError {
    /// Element count differs from `product(shape)`.
    #[error("{key}: shape {shape:?} needs {expected} elements, got {actual}")]
    DataLength {
        /// Tensor key.
        key: String,
        /// Declared shape.
        shape: Vec<u32>,
        /// `product(shape)`.
        expected: usize,
        /// Elements present.
        actual: usize,
    },

    /// Operation needs a 4-D `[OC, IC, KH, KW]` tensor.
    #[error("{key}: expected a 4-D [OC, IC, KH, KW] shape, got {shape:?}")]
    NotFourDimensional {
        /// Tensor key.
        key: String,
        /// Actual shape.
        shape: Vec<u32>,
    },
}

/// Errors from loading or saving containers.
#[derive(Error, Debug)]
pub enum SerializeError {
    /// Malformed bytes.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Shape/data disagreement.
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),

    /// Input file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem error.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SerializeError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SerializeError::Io {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
