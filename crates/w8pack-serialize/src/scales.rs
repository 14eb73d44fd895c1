//! Scale Table Side File
//!
//! `count` (u32) followed by one little-endian f32 per INT8 tensor, in container
//! order. Written next to a typed container for consumers that load scales
//! separately.

use crate::container::Container;
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::FormatError;

/// Scales of every INT8 record, in container order.
#[must_use]
pub fn collect_scales(container: &Container) -> Vec<f32> {
    container.iter().filter_map(|r| r.scale()).collect()
}

/// Encodes a scale table.
pub fn encode_scales(scales: &[f32]) -> Result<Vec<u8>, FormatError> {
    let mut writer = ByteWriter::with_capacity(4 + scales.len() * 4);
    writer.write_len(scales.len(), "scale count")?;
    for &s in scales {
        writer.write_f32(s);
    }
    Ok(writer.into_inner())
}

/// Decodes a scale table.
pub fn decode_scales(bytes: &[u8]) -> Result<Vec<f32>, FormatError> {
    let mut reader = ByteReader::new(bytes);
    let count = reader.read_u32("scale count")? as usize;
    let mut scales = Vec::with_capacity(count.min(reader.remaining() / 4));
    for i in 0..count {
        reader.set_tensor(i);
        scales.push(reader.read_f32("scale")?);
    }
    Ok(scales)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::TensorRecord;

    #[test]
    fn test_collect_and_roundtrip() {
        let container = Container::from_records(vec![
            TensorRecord::int8("a.weight", vec![1], vec![1], 0.25).unwrap(),
            TensorRecord::float32("a.bias", vec![1], vec![0.0]).unwrap(),
            TensorRecord::int8("b.weight", vec![1], vec![1], 0.5).unwrap(),
        ])
        .unwrap();

        let scales = collect_scales(&container);
        assert_eq!(scales, vec![0.25, 0.5]);

        let bytes = encode_scales(&scales).unwrap();
        assert_eq!(bytes.len(), 4 + 8);
        assert_eq!(decode_scales(&bytes).unwrap(), scales);
    }

    #[test]
    fn test_truncated_scale_table() {
        let bytes = encode_scales(&[1.0, 2.0]).unwrap();
        assert!(decode_scales(&bytes[..6]).is_err());
    }
}
