//! Accelerator Layout Repacking
//!
//! Reorders a quantized `[OC, IC, KH, KW]` convolution weight into the read
//! order of the accelerator's weight memory.
//!
//! The accelerator reads one 32-bit word per lane group. Address order, outer to
//! inner:
//!
//! ```text
//! for oc_block in 0..ceil(OC / 32)
//!   for ic in 0..IC
//!     for kh in 0..KH
//!       for kw in 0..KW
//!         for cluster in 0..8
//!           word = lane0 | lane1 << 8 | lane2 << 16 | lane3 << 24
//!           lane pe holds oc = oc_block * 32 + cluster * 4 + pe (0 when oc >= OC)
//! ```
//!
//! Words are stored little-endian.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use rayon::prelude::*;
use w8pack_serialize::{Container, RepackedContainer, ShapeMismatchError, TensorRecord};

use crate::error::QuantResult;
use crate::quantize::quantize_tensor;

// =============================================================================
// Constants
// =============================================================================

/// Output channels per block.
pub const OC_BLOCK: usize = 32;

/// Clusters per block.
pub const CLUSTERS: usize = 8;

/// Lanes (output channels) per 32-bit word.
pub const LANES: usize = 4;

/// Bytes of one cluster word.
pub const WORD_BYTES: usize = 4;

// =============================================================================
// Layout Helpers
// =============================================================================

/// Number of 32-channel blocks for `oc` output channels.
pub fn oc_blocks(oc: usize) -> usize {
    oc.div_ceil(OC_BLOCK)
}

/// Size in bytes of the repacked form of a `[OC, IC, KH, KW]` tensor.
pub fn repacked_len(dims: [usize; 4]) -> usize {
    let [oc, ic, kh, kw] = dims;
    oc_blocks(oc) * ic * kh * kw * CLUSTERS * WORD_BYTES
}

/// Byte offset of a lane inside a repacked blob.
///
/// `address` is `ic * KH * KW + kh * KW + kw` within the block.
pub fn lane_offset(dims: [usize; 4], oc_block: usize, address: usize, cluster: usize, pe: usize) -> usize {
    let [_, ic, kh, kw] = dims;
    let addresses = ic * kh * kw;
    ((oc_block * addresses + address) * CLUSTERS + cluster) * WORD_BYTES + pe
}

/// Reads one lane back out of a repacked blob.
///
/// Returns `None` when the coordinate lies outside the blob or the layout of
/// `dims`.
pub fn lane_value(
    blob: &[u8],
    dims: [usize; 4],
    oc_block: usize,
    address: usize,
    cluster: usize,
    pe: usize,
) -> Option<i8> {
    let [oc, ic, kh, kw] = dims;
    if cluster >= CLUSTERS
        || pe >= LANES
        || address >= ic * kh * kw
        || oc_block >= oc_blocks(oc)
    {
        return None;
    }
    blob.get(lane_offset(dims, oc_block, address, cluster, pe))
        .map(|&b| b as i8)
}

// =============================================================================
// Repacking
// =============================================================================

/// Repacks row-major `[OC, IC, KH, KW]` INT8 values into accelerator order.
pub fn repack_conv_weight(
    key: &str,
    values: &[i8],
    dims: [usize; 4],
) -> Result<Vec<u8>, ShapeMismatchError> {
    let [oc, ic, kh, kw] = dims;
    let expected = oc * ic * kh * kw;
    if values.len() != expected {
        return Err(ShapeMismatchError::DataLength {
            key: key.to_string(),
            shape: dims.iter().map(|&d| d as u32).collect(),
            expected,
            actual: values.len(),
        });
    }

    let ic_stride = kh * kw;
    let oc_stride = ic * ic_stride;
    let mut out = Vec::with_capacity(repacked_len(dims));

    for block in 0..oc_blocks(oc) {
        for i in 0..ic {
            for h in 0..kh {
                for w in 0..kw {
                    let base = i * ic_stride + h * kw + w;
                    for cluster in 0..CLUSTERS {
                        let mut word = 0u32;
                        for pe in 0..LANES {
                            let channel = block * OC_BLOCK + cluster * LANES + pe;
                            if channel < oc {
                                let byte = values[channel * oc_stride + base] as u8;
                                word |= u32::from(byte) << (pe * 8);
                            }
                        }
                        out.extend_from_slice(&word.to_le_bytes());
                    }
                }
            }
        }
    }

    Ok(out)
}

/// Inverse of [`repack_conv_weight`]: recovers the row-major INT8 values.
pub fn unpack_conv_weight(
    key: &str,
    blob: &[u8],
    dims: [usize; 4],
) -> Result<Vec<i8>, ShapeMismatchError> {
    let expected = repacked_len(dims);
    if blob.len() != expected {
        return Err(ShapeMismatchError::DataLength {
            key: key.to_string(),
            shape: dims.iter().map(|&d| d as u32).collect(),
            expected,
            actual: blob.len(),
        });
    }

    let [oc, ic, kh, kw] = dims;
    let addresses = ic * kh * kw;
    let mut values = vec![0i8; oc * addresses];
    for (channel, row) in values.chunks_mut(addresses.max(1)).enumerate().take(oc) {
        let block = channel / OC_BLOCK;
        let cluster = (channel % OC_BLOCK) / LANES;
        let pe = channel % LANES;
        for (address, value) in row.iter_mut().enumerate() {
            *value = blob[lane_offset(dims, block, address, cluster, pe)] as i8;
        }
    }
    Ok(values)
}

/// True for 4-D records whose key ends with `weight_suffix`.
pub fn is_repack_eligible(record: &TensorRecord, weight_suffix: &str) -> bool {
    record.has_suffix(weight_suffix) && record.shape().len() == 4
}

/// Repacks one record.
///
/// Float records are quantized first through the same quantizer used for typed
/// containers, so both inputs give identical bytes for the same tensor.
pub fn repack_record(record: &TensorRecord) -> QuantResult<Vec<u8>> {
    let dims = record.conv_dims()?;
    let quantized = quantize_tensor(record)?;
    let blob = repack_conv_weight(record.key(), &quantized.values, dims)?;
    tracing::debug!(
        key = record.key(),
        dims = ?dims,
        dtype = %record.dtype(),
        bytes = blob.len(),
        "repacked"
    );
    Ok(blob)
}

/// Repacks every eligible record of a float or typed container.
///
/// Ineligible records are skipped. Output keeps input order.
pub fn repack_container(container: &Container, weight_suffix: &str) -> QuantResult<RepackedContainer> {
    let eligible: Vec<&TensorRecord> = container
        .iter()
        .filter(|record| {
            let keep = is_repack_eligible(record, weight_suffix);
            if !keep {
                tracing::debug!(key = record.key(), shape = ?record.shape(), "skipped");
            }
            keep
        })
        .collect();

    let blobs = eligible
        .par_iter()
        .map(|record| repack_record(record).map(|blob| (record.key().to_string(), blob)))
        .collect::<QuantResult<Vec<_>>>()?;

    let mut output = RepackedContainer::new();
    for (key, blob) in blobs {
        output.push(key, blob)?;
    }

    tracing::info!(
        repacked = output.len(),
        skipped = container.len() - output.len(),
        bytes = output.blob_bytes(),
        "repacked container"
    );
    Ok(output)
}

// =============================================================================
// Tests
// =============================================================================
