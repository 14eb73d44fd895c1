//! Quantization Error Types
//!
//! Error types for quantization, repacking and calibration.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;
use w8pack_serialize::{FormatError, SerializeError, ShapeMismatchError};

/// Result type for quantization operations.
pub type QuantResult<T> = Result<T, QuantError>;

/// Errors that can occur during quantization.
#[derive(Error, Debug)]
pub enum QuantError {
    /// Shape and data disagree, or a 4-D tensor was required.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(#[from] ShapeMismatchError),

    /// Malformed container while building output.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Container file could not be read or written.
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// A weight tensor holds NaN or infinity.
    #[error("{key}: non-finite value at element {index}")]
    NonFiniteWeight {
        /// Tensor key.
        key: String,
        /// First offending element.
        index: usize,
    },

    /// A layer table entry is not present in the source container.
    #[error("layer {index}: weight key {key:?} not found")]
    MissingLayer {
        /// Layer index.
        index: usize,
        /// Expected key.
        key: String,
    },

    /// Every calibrated layer equals the fallback default.
    #[error("degenerate calibration: all {layers} layers use the default {mode} value {value}")]
    DegenerateCalibration {
        /// Number of layers.
        layers: usize,
        /// Calibration mode name.
        mode: &'static str,
        /// The shared default value.
        value: u32,
    },

    /// Layer table failed validation.
    #[error("Invalid layer table: {0}")]
    InvalidLayerTable(String),

    /// Layer table was written for another schema version.
    #[error("Unsupported layer table version {found} (expected {expected})")]
    UnsupportedTableVersion {
        /// Version in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// Layer table TOML could not be parsed.
    #[error("Layer table parse error: {0}")]
    TableParse(#[from] toml::de::Error),

    /// Layer table could not be read from disk.
    #[error("Failed to read layer table {path}: {source}")]
    TableIo {
        /// Table path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
