//! Format Detection and Management
//!
//! The three on-disk container variants and how to pick one for a path.

use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Limits
// =============================================================================

/// Longest key accepted by the readers.
pub const MAX_KEY_LEN: usize = 1024;

/// Highest rank accepted by the readers.
pub const MAX_NDIM: usize = 16;

/// File stem suffix of typed (quantized) containers, e.g. `weights_w8.bin`.
pub const TYPED_STEM_SUFFIX: &str = "_w8";

/// File stem suffix of repacked-blob containers, e.g. `weights_acc_repack.bin`.
pub const REPACKED_STEM_SUFFIX: &str = "_acc_repack";

// =============================================================================
// Format Enum
// =============================================================================

/// Container variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// Float32 only, no dtype byte.
    Float,
    /// Dtype tag per tensor, INT8 tensors carry a scale.
    Typed,
    /// Key + opaque blob per entry, no metadata.
    Repacked,
}

impl ContainerFormat {
    /// Get a human-readable name for this format.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Float => "plain float",
            ContainerFormat::Typed => "typed",
            ContainerFormat::Repacked => "repacked blob",
        }
    }

    /// Check if records carry shape/dtype metadata.
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        !matches!(self, ContainerFormat::Repacked)
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Detect the variant from the file naming convention.
///
/// The variants have no magic bytes, so the stem decides: `*_w8` is typed,
/// `*_acc_repack` is repacked, anything else is plain float.
pub fn detect_format<P: AsRef<Path>>(path: P) -> ContainerFormat {
    let stem = path
        .as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    if stem.ends_with(REPACKED_STEM_SUFFIX) {
        ContainerFormat::Repacked
    } else if stem.ends_with(TYPED_STEM_SUFFIX) {
        ContainerFormat::Typed
    } else {
        ContainerFormat::Float
    }
}

// =============================================================================
// Tests
// =============================================================================
