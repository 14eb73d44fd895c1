//! CLI - Command Line Interface Definitions
//!
//! Defines the CLI structure using clap derive macros.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use w8pack_quant::CalibrationMode;
use w8pack_serialize::ContainerFormat;

// =============================================================================
// Main CLI Structure
// =============================================================================

/// w8pack - INT8 weight preparation for the convolution accelerator
#[derive(Parser, Debug)]
#[command(
    name = "w8pack",
    author = "AutomataNexus Development Team",
    version,
    about = "Quantize, repack and calibrate weights for the INT8 convolution accelerator",
    long_about = "w8pack turns a float32 tensor container into the INT8 weights, accelerator-ordered \
                  blobs and per-layer requantization constants the W8A16 accelerator consumes.\n\n\
                  Paths default to the assets/ layout and can be overridden per command or in w8pack.toml."
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to ./w8pack.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Quantize float weights into a typed INT8 container
    Quantize(QuantizeArgs),

    /// Repack convolution weights into accelerator read order
    Repack(RepackArgs),

    /// Compute per-layer requantization multipliers or shifts
    Calibrate(CalibrateArgs),

    /// Show the tensors of a container
    Inspect(InspectArgs),

    /// Check a typed container against a fresh quantization of the float source
    Verify(VerifyArgs),
}

// =============================================================================
// Value Enums
// =============================================================================

/// Container variant
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    /// Plain float32 container
    Float,
    /// Typed container with INT8 records
    Typed,
    /// Repacked accelerator blobs
    Repacked,
}

impl From<FormatArg> for ContainerFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Float => ContainerFormat::Float,
            FormatArg::Typed => ContainerFormat::Typed,
            FormatArg::Repacked => ContainerFormat::Repacked,
        }
    }
}

/// Requantization constant kind
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeArg {
    /// Q0.16 multiplier, `round(scale * 65536)`
    Multiplier,
    /// Power-of-two shift, `round(log2(1 / scale))`
    Shift,
}

impl From<ModeArg> for CalibrationMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Multiplier => CalibrationMode::Multiplier,
            ModeArg::Shift => CalibrationMode::Shift,
        }
    }
}

/// Calibration output rendering
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleArg {
    /// `LAYER_MULTIPLIER_<i> = <value>` lines
    Assignments,
    /// C header with `#define` constants
    Header,
    /// JSON report
    Json,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the quantize command
#[derive(Parser, Debug)]
pub struct QuantizeArgs {
    /// Float container (default: assets/weights.bin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Typed output container (default: assets/weights_w8.bin)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write the INT8 scales as a side file
    #[arg(long, value_name = "PATH")]
    pub out_scales: Option<PathBuf>,

    /// Layer table TOML (provides the weight suffix)
    #[arg(long, value_name = "TABLE")]
    pub layers: Option<PathBuf>,
}

/// Arguments for the repack command
#[derive(Parser, Debug)]
pub struct RepackArgs {
    /// Float or typed container (default: assets/weights_w8.bin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Repacked output (default: assets/weights_acc_repack.bin)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Input variant (detected from the file name when omitted)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Also write quantized INT32 biases as a repacked-blob container
    #[arg(long, value_name = "PATH")]
    pub bias_out: Option<PathBuf>,

    /// Layer table TOML (provides the weight suffix)
    #[arg(long, value_name = "TABLE")]
    pub layers: Option<PathBuf>,
}

/// Arguments for the calibrate command
#[derive(Parser, Debug)]
pub struct CalibrateArgs {
    /// Float or typed container (default: assets/weights_w8.bin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Input variant (detected from the file name when omitted)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Constant kind (default: multiplier)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Output file, `-` for stdout (default: assets/layers_config.h)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output rendering (default: from the output extension)
    #[arg(long, value_enum)]
    pub style: Option<StyleArg>,

    /// Layer table TOML (default: built-in YOLOv5n table)
    #[arg(long, value_name = "TABLE")]
    pub layers: Option<PathBuf>,

    /// Fail when every layer falls back to the default value
    #[arg(long)]
    pub deny_degenerate: bool,
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Container file
    pub input: PathBuf,

    /// Container variant (detected from the file name when omitted)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Print a JSON report instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the verify command
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Float source container (default: assets/weights.bin)
    #[arg(long = "float", value_name = "PATH")]
    pub float_path: Option<PathBuf>,

    /// Typed container to check (default: assets/weights_w8.bin)
    #[arg(long = "quantized", value_name = "PATH")]
    pub quantized_path: Option<PathBuf>,

    /// Layer table TOML (provides the weight suffix)
    #[arg(long, value_name = "TABLE")]
    pub layers: Option<PathBuf>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_calibrate() {
        let cli = Cli::parse_from([
            "w8pack",
            "-v",
            "calibrate",
            "--mode",
            "shift",
            "--style",
            "header",
            "-o",
            "-",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Calibrate(args) => {
                assert_eq!(args.mode, Some(ModeArg::Shift));
                assert_eq!(args.style, Some(StyleArg::Header));
                assert_eq!(args.output, Some(PathBuf::from("-")));
                assert!(!args.deny_degenerate);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["w8pack", "-v", "-q", "inspect", "x.bin"]).is_err());
    }
}
