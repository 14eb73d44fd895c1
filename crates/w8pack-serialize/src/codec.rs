//! Tensor Container Codec
//!
//! Reads and writes the plain float and typed container variants. Both share
//! one record header and differ only in what follows the shape.
//!
//! # Layout
//!
//! All integers are little-endian `u32`, offsets are from the start of the file.
//!
//! ```text
//! count
//! repeat count times:
//!     key_len                      (<= 1024)
//!     key bytes                    (UTF-8)
//!     ndim                         (<= 16)
//!     dims[ndim]
//!     -- plain float variant --
//!     zero padding to a multiple of 4
//!     f32 data[product(dims)]
//!     -- typed variant --
//!     dtype                        (u8: 0 = f32, 1 = i8)
//!     scale                        (f32, only when dtype = 1)
//!     zero padding to a multiple of 4
//!     data[product(dims) * size(dtype)]
//! ```

use crate::container::{shape_numel, Container, DType, TensorData, TensorRecord};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{FormatError, SerializeResult, TensorIndex};
use crate::format::{ContainerFormat, MAX_KEY_LEN, MAX_NDIM};

// =============================================================================
// Decoding
// =============================================================================

/// Decodes a plain float or typed container.
pub fn decode_container(bytes: &[u8], format: ContainerFormat) -> SerializeResult<Container> {
    let typed = match format {
        ContainerFormat::Float => false,
        ContainerFormat::Typed => true,
        ContainerFormat::Repacked => {
            return Err(FormatError::NoMetadata {
                format: format.name(),
            }
            .into())
        }
    };

    let mut reader = ByteReader::new(bytes);
    let count = reader.read_u32("tensor count")? as usize;
    let mut container = Container::new();

    for i in 0..count {
        reader.set_tensor(i);
        let record = decode_record(&mut reader, typed)?;
        container.push(record)?;
    }

    if reader.remaining() > 0 {
        tracing::debug!(
            trailing = reader.remaining(),
            "ignoring bytes after the last tensor"
        );
    }

    Ok(container)
}

/// Reads a key length prefix and the key.
pub(crate) fn read_key(reader: &mut ByteReader<'_>) -> Result<String, FormatError> {
    let len = reader.read_u32("key length")? as usize;
    if len > MAX_KEY_LEN {
        return Err(FormatError::InvalidKeyLength {
            tensor: reader.tensor(),
            len,
            max: MAX_KEY_LEN,
        });
    }
    let bytes = reader.take(len, "key")?;
    String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidKey {
        tensor: reader.tensor(),
    })
}

fn decode_record(reader: &mut ByteReader<'_>, typed: bool) -> SerializeResult<TensorRecord> {
    let key = read_key(reader)?;

    let ndim = reader.read_u32("ndim")? as usize;
    if ndim > MAX_NDIM {
        return Err(FormatError::InvalidShape {
            tensor: reader.tensor(),
            key,
            reason: format!("ndim {ndim} exceeds {MAX_NDIM}"),
        }
        .into());
    }
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(reader.read_u32("shape")?);
    }

    let dtype = if typed {
        let tag = reader.read_u8("dtype")?;
        DType::from_tag(tag).ok_or_else(|| FormatError::InvalidDtype {
            tensor: reader.tensor(),
            key: key.clone(),
            tag,
        })?
    } else {
        DType::F32
    };
    let scale = match dtype {
        DType::I8 => Some(reader.read_f32("scale")?),
        DType::F32 => None,
    };

    reader.align()?;

    let byte_len = shape_numel(&shape)
        .and_then(|n| n.checked_mul(dtype.size()))
        .ok_or_else(|| FormatError::InvalidShape {
            tensor: reader.tensor(),
            key: key.clone(),
            reason: format!("element count of {shape:?} overflows"),
        })?;
    let raw = reader.take(byte_len, "data")?;

    let data = match scale {
        None => TensorData::Float32(
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        Some(scale) => TensorData::Int8 {
            values: raw.iter().map(|&b| b as i8).collect(),
            scale,
        },
    };

    Ok(TensorRecord::new(key, shape, data)?)
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes a container as the plain float or typed variant.
///
/// The plain float variant cannot hold INT8 records.
pub fn encode_container(container: &Container, format: ContainerFormat) -> SerializeResult<Vec<u8>> {
    let typed = match format {
        ContainerFormat::Float => false,
        ContainerFormat::Typed => true,
        ContainerFormat::Repacked => {
            return Err(FormatError::NoMetadata {
                format: format.name(),
            }
            .into())
        }
    };

    let mut writer = ByteWriter::with_capacity(container.data_bytes() + container.len() * 64);
    writer.write_len(container.len(), "tensor count")?;

    for (i, record) in container.iter().enumerate() {
        write_key(&mut writer, record.key(), TensorIndex::At(i))?;

        let shape = record.shape();
        if shape.len() > MAX_NDIM {
            return Err(FormatError::InvalidShape {
                tensor: TensorIndex::At(i),
                key: record.key().to_string(),
                reason: format!("ndim {} exceeds {MAX_NDIM}", shape.len()),
            }
            .into());
        }
        writer.write_len(shape.len(), "ndim")?;
        for &dim in shape {
            writer.write_u32(dim);
        }

        if typed {
            writer.write_u8(record.dtype().tag());
            if let Some(scale) = record.scale() {
                writer.write_f32(scale);
            }
        } else if record.dtype() != DType::F32 {
            return Err(FormatError::UnsupportedDtype {
                tensor: TensorIndex::At(i),
                key: record.key().to_string(),
                dtype: record.dtype().name(),
                format: format.name(),
            }
            .into());
        }

        writer.align();
        record.data().write_le(writer.buffer_mut());
    }

    Ok(writer.into_inner())
}

/// Writes a key length prefix and the key.
pub(crate) fn write_key(
    writer: &mut ByteWriter,
    key: &str,
    tensor: TensorIndex,
) -> Result<(), FormatError> {
    let bytes = key.as_bytes();
    if bytes.len() > MAX_KEY_LEN {
        return Err(FormatError::InvalidKeyLength {
            tensor,
            len: bytes.len(),
            max: MAX_KEY_LEN,
        });
    }
    writer.write_len(bytes.len(), "key length")?;
    writer.write_bytes(bytes);
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
