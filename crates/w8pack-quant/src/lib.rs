//! W8pack Quant - Accelerator Weight Preparation
//!
//! Turns float convolution weights into the INT8 data and fixed-point
//! constants consumed by the W8A16 convolution accelerator:
//!
//! - **Quantize**: symmetric per-tensor INT8 with one f32 scale
//! - **Repack**: accelerator read order, four output channels per 32-bit word
//! - **Bias**: INT32 accumulator biases, `round(b * 1024 / scale)`
//! - **Calibrate**: per-layer Q0.16 multipliers or power-of-two shifts
//!
//! # Example
//! ```ignore
//! use w8pack_quant::{quantize_container, repack_container, calibrate, CalibrationMode, LayerTable};
//!
//! let table = LayerTable::yolov5n();
//! let typed = quantize_container(&weights, &table.weight_suffix)?;
//! let blobs = repack_container(&typed, &table.weight_suffix)?;
//! let config = calibrate(&typed, &table, CalibrationMode::Multiplier, "weights_w8.bin");
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod bias;
pub mod calibration;
pub mod dequantize;
pub mod error;
pub mod layers;
pub mod quantize;
pub mod repack;
pub mod types;

pub use bias::{quantize_bias, repack_biases};
pub use calibration::{
    calibrate, multiplier_for_scale, shift_for_scale, CalibratedValue, CalibrationEntry,
    CalibrationMode, CalibrationTable, FallbackReason,
};
pub use dequantize::{dequantize_container, dequantize_tensor, dequantize_values};
pub use error::{QuantError, QuantResult};
pub use layers::{LayerEntry, LayerRole, LayerTable};
pub use quantize::{
    compute_quantization_error, compute_quantization_stats, quantize_container,
    quantize_symmetric, quantize_tensor, QuantizationStats,
};
pub use repack::{lane_value, repack_container, repack_conv_weight, unpack_conv_weight};
pub use types::{QuantizedTensor, DEFAULT_WEIGHT_SUFFIX};
