//! W8pack Serialize - Tensor Container Codec
//!
//! Reads and writes the binary tensor containers exchanged between the weight
//! preparation tools and the INT8 accelerator runtime.
//!
//! # Supported Variants
//!
//! - **Plain float** - float32 tensors, 4-byte aligned data blocks
//! - **Typed** - per-tensor dtype tag, INT8 tensors carry their scale
//! - **Repacked blob** - named accelerator-ordered byte blobs
//!
//! # Example
//!
//! ```ignore
//! use w8pack_serialize::{load_container, save_container, ContainerFormat};
//!
//! let weights = load_container("assets/weights.bin", ContainerFormat::Float)?;
//! save_container(&weights, "assets/copy.bin", ContainerFormat::Float)?;
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

// =============================================================================
// Modules
// =============================================================================

mod codec;
mod container;
mod convert;
mod cursor;
mod error;
mod format;
mod repacked;
mod scales;

// =============================================================================
// Re-exports
// =============================================================================

pub use codec::{decode_container, encode_container};
pub use container::{shape_numel, Container, DType, TensorData, TensorRecord};
pub use convert::{find_record, normalize_key, paired_bias_key};
pub use cursor::{padding_for, ByteReader, ByteWriter, DATA_ALIGN};
pub use error::{FormatError, SerializeError, SerializeResult, ShapeMismatchError, TensorIndex};
pub use format::{
    detect_format, ContainerFormat, MAX_KEY_LEN, MAX_NDIM, REPACKED_STEM_SUFFIX,
    TYPED_STEM_SUFFIX,
};
pub use repacked::{RepackedContainer, RepackedEntry};
pub use scales::{collect_scales, decode_scales, encode_scales};

// =============================================================================
// Imports
// =============================================================================

use std::io::Write;
use std::path::{Path, PathBuf};

// =============================================================================
// High-Level API
// =============================================================================

/// Absolute form of `path` for error reports.
#[must_use]
pub fn resolve_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Reads a whole file, reporting a missing file with its resolved path.
pub fn read_file<P: AsRef<Path>>(path: P) -> SerializeResult<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SerializeError::NotFound(resolve_path(path))
        } else {
            SerializeError::io(resolve_path(path), e)
        }
    })
}

/// Writes `bytes` to `path` through a temporary file in the same directory.
///
/// The destination either keeps its old content or receives the complete new
/// content; a failed run never leaves a partial file behind.
pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> SerializeResult<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| SerializeError::io(&dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| SerializeError::io(&dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| SerializeError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| SerializeError::io(resolve_path(path), e.error))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

/// Load a plain float or typed container from a file.
pub fn load_container<P: AsRef<Path>>(path: P, format: ContainerFormat) -> SerializeResult<Container> {
    let path = path.as_ref();
    let bytes = read_file(path)?;
    let container = decode_container(&bytes, format)?;
    tracing::debug!(
        path = %path.display(),
        format = %format,
        tensors = container.len(),
        "loaded container"
    );
    Ok(container)
}

/// Save a container as the plain float or typed variant.
pub fn save_container<P: AsRef<Path>>(
    container: &Container,
    path: P,
    format: ContainerFormat,
) -> SerializeResult<()> {
    let bytes = encode_container(container, format)?;
    write_atomic(path, &bytes)
}

/// Load a repacked-blob container.
pub fn load_repacked<P: AsRef<Path>>(path: P) -> SerializeResult<RepackedContainer> {
    let bytes = read_file(path)?;
    Ok(RepackedContainer::decode(&bytes)?)
}

/// Save a repacked-blob container.
pub fn save_repacked<P: AsRef<Path>>(container: &RepackedContainer, path: P) -> SerializeResult<()> {
    let bytes = container.encode()?;
    write_atomic(path, &bytes)
}

/// Save a scale table side file.
pub fn save_scales<P: AsRef<Path>>(scales: &[f32], path: P) -> SerializeResult<()> {
    let bytes = encode_scales(scales)?;
    write_atomic(path, &bytes)
}

/// Load a scale table side file.
pub fn load_scales<P: AsRef<Path>>(path: P) -> SerializeResult<Vec<f32>> {
    let bytes = read_file(path)?;
    Ok(decode_scales(&bytes)?)
}

// =============================================================================
// Tests
// =============================================================================
