//! Repacked Blob Container
//!
//! Output of the accelerator repacker: named byte blobs with no shape or dtype
//! metadata. Consumers already know the shapes.
//!
//! ```text
//! count
//! repeat count times:
//!     key_len, key bytes
//!     blob_len, blob bytes
//! ```

use crate::codec::{read_key, write_key};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{FormatError, TensorIndex};

/// One named blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackedEntry {
    /// Source tensor key.
    pub key: String,
    /// Accelerator-ordered bytes.
    pub blob: Vec<u8>,
}

/// Ordered collection of repacked blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepackedContainer {
    entries: Vec<RepackedEntry>,
}

impl RepackedContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a blob. Fails on a repeated key.
    pub fn push(&mut self, key: impl Into<String>, blob: Vec<u8>) -> Result<(), FormatError> {
        let key = key.into();
        if self.get(&key).is_some() {
            return Err(FormatError::DuplicateKey {
                tensor: TensorIndex::At(self.entries.len()),
                key,
            });
        }
        self.entries.push(RepackedEntry { key, blob });
        Ok(())
    }

    /// Get a blob by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.blob.as_slice())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = &RepackedEntry> {
        self.entries.iter()
    }

    /// Total blob bytes.
    #[must_use]
    pub fn blob_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.blob.len()).sum()
    }

    /// Decodes the blob variant.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.read_u32("entry count")? as usize;
        let mut container = Self::new();

        for i in 0..count {
            reader.set_tensor(i);
            let key = read_key(&mut reader)?;
            let len = reader.read_u32("blob length")? as usize;
            let blob = reader.take(len, "blob")?.to_vec();
            container.push(key, blob)?;
        }

        Ok(container)
    }

    /// Encodes the blob variant.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        let mut writer = ByteWriter::with_capacity(self.blob_bytes() + self.entries.len() * 64);
        writer.write_len(self.entries.len(), "entry count")?;
        for (i, entry) in self.entries.iter().enumerate() {
            write_key(&mut writer, &entry.key, TensorIndex::At(i))?;
            writer.write_len(entry.blob.len(), "blob length")?;
            writer.write_bytes(&entry.blob);
        }
        Ok(writer.into_inner())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let mut c = RepackedContainer::new();
        c.push("ab", vec![9, 8, 7]).unwrap();
        let bytes = c.encode().unwrap();

        assert_eq!(
            bytes,
            vec![1, 0, 0, 0, 2, 0, 0, 0, b'a', b'b', 3, 0, 0, 0, 9, 8, 7]
        );
    }

    #[test]
    fn test_roundtrip() {
        let mut c = RepackedContainer::new();
        c.push("model.0.conv.weight", vec![1, 2, 3, 4]).unwrap();
        c.push("model.1.conv.weight", vec![]).unwrap();

        let bytes = c.encode().unwrap();
        let decoded = RepackedContainer::decode(&bytes).unwrap();
        assert_eq!(decoded, c);
        assert_eq!(decoded.get("model.0.conv.weight"), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(decoded.blob_bytes(), 4);
    }

    #[test]
    fn test_truncated_blob() {
        let mut c = RepackedContainer::new();
        c.push("w", vec![0; 8]).unwrap();
        let bytes = c.encode().unwrap();

        let err = RepackedContainer::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            FormatError::Truncated { tensor: TensorIndex::At(0), field: "blob", .. }
        ));
    }

    #[test]
    fn test_duplicate_key() {
        let mut c = RepackedContainer::new();
        c.push("w", vec![]).unwrap();
        assert!(c.push("w", vec![1]).is_err());
    }
}
