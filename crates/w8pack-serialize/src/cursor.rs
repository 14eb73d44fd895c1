//! Byte Cursor
//!
//! Bounds-checked little-endian reader and the matching writer used by every
//! container variant. Offsets are measured from the start of the buffer, which
//! is also what the 4-byte alignment rule refers to.

use crate::error::{FormatError, TensorIndex};

/// Alignment of every data block.
pub const DATA_ALIGN: usize = 4;

/// Padding needed to bring `offset` to the next multiple of [`DATA_ALIGN`].
#[must_use]
pub const fn padding_for(offset: usize) -> usize {
    (DATA_ALIGN - offset % DATA_ALIGN) % DATA_ALIGN
}

// =============================================================================
// ByteReader
// =============================================================================

/// Reader over a borrowed buffer.
///
/// Every read names the field it is after so a truncation error says what was
/// missing and for which tensor.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    tensor: TensorIndex,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader at offset 0.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            tensor: TensorIndex::Header,
        }
    }

    /// Sets the tensor index reported by subsequent errors.
    pub fn set_tensor(&mut self, index: usize) {
        self.tensor = TensorIndex::At(index);
    }

    /// Tensor index currently being parsed.
    #[must_use]
    pub fn tensor(&self) -> TensorIndex {
        self.tensor
    }

    /// Current offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Takes `n` bytes.
    pub fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(FormatError::Truncated {
                tensor: self.tensor,
                field,
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, FormatError> {
        Ok(self.take_array::<1>(field)?[0])
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, FormatError> {
        self.take_array::<4>(field).map(u32::from_le_bytes)
    }

    /// Reads a little-endian f32.
    pub fn read_f32(&mut self, field: &'static str) -> Result<f32, FormatError> {
        self.take_array::<4>(field).map(f32::from_le_bytes)
    }

    /// Skips the zero padding before a data block.
    pub fn align(&mut self) -> Result<(), FormatError> {
        let pad = padding_for(self.pos);
        self.take(pad, "alignment padding").map(|_| ())
    }
}

// =============================================================================
// ByteWriter
// =============================================================================

/// Growable output buffer with the same layout helpers as [`ByteReader`].
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current length.
    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Writes a little-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a `usize` as a u32 length prefix.
    pub fn write_len(&mut self, v: usize, what: &'static str) -> Result<(), FormatError> {
        let v = u32::try_from(v).map_err(|_| FormatError::LengthOverflow { what, value: v })?;
        self.write_u32(v);
        Ok(())
    }

    /// Writes a little-endian f32.
    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes zero padding up to the next aligned offset.
    pub fn align(&mut self) {
        let pad = padding_for(self.buf.len());
        self.buf.resize(self.buf.len() + pad, 0);
    }

    /// Mutable access for bulk data writers.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Finishes and returns the bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// Tests
// =============================================================================
