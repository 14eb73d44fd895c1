//! Config - Configuration File Handling
//!
//! Handles the optional `w8pack.toml` that overrides default paths and
//! calibration settings. Command-line flags take precedence over the file.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::ModeArg;
use crate::error::{CliError, CliResult};

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "w8pack.toml";

// =============================================================================
// Tool Configuration
// =============================================================================

/// Tool configuration (w8pack.toml)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct W8packConfig {
    /// Default file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Calibration settings
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Default file locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Float container exported from the training checkpoint
    #[serde(default = "default_float_weights")]
    pub float_weights: PathBuf,

    /// Typed (INT8) container
    #[serde(default = "default_typed_weights")]
    pub typed_weights: PathBuf,

    /// Repacked accelerator blobs
    #[serde(default = "default_repacked_weights")]
    pub repacked_weights: PathBuf,

    /// Generated layer configuration header
    #[serde(default = "default_layers_header")]
    pub layers_header: PathBuf,

    /// Layer table (built-in YOLOv5n table when unset)
    #[serde(default)]
    pub layer_table: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            float_weights: default_float_weights(),
            typed_weights: default_typed_weights(),
            repacked_weights: default_repacked_weights(),
            layers_header: default_layers_header(),
            layer_table: None,
        }
    }
}

fn default_float_weights() -> PathBuf {
    PathBuf::from("assets/weights.bin")
}
fn default_typed_weights() -> PathBuf {
    PathBuf::from("assets/weights_w8.bin")
}
fn default_repacked_weights() -> PathBuf {
    PathBuf::from("assets/weights_acc_repack.bin")
}
fn default_layers_header() -> PathBuf {
    PathBuf::from("assets/layers_config.h")
}

/// Calibration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationConfig {
    /// Constant kind
    #[serde(default = "default_mode")]
    pub mode: ModeArg,

    /// Treat an all-default run as an error
    #[serde(default)]
    pub deny_degenerate: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            deny_degenerate: false,
        }
    }
}

fn default_mode() -> ModeArg {
    ModeArg::Multiplier
}

// =============================================================================
// Loading
// =============================================================================

impl W8packConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> CliResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
        let config: W8packConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Explicit file if given, `w8pack.toml` if present, defaults otherwise
    pub fn resolve(explicit: Option<&Path>) -> CliResult<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = W8packConfig::default();
        assert_eq!(config.paths.float_weights, PathBuf::from("assets/weights.bin"));
        assert_eq!(config.paths.typed_weights, PathBuf::from("assets/weights_w8.bin"));
        assert_eq!(config.calibration.mode, ModeArg::Multiplier);
        assert!(!config.calibration.deny_degenerate);
    }

    #[test]
    fn test_partial_config() {
        let config: W8packConfig = toml::from_str(
            r#"
[paths]
typed_weights = "out/w8.bin"

[calibration]
mode = "shift"
"#,
        )
        .unwrap();
        assert_eq!(config.paths.typed_weights, PathBuf::from("out/w8.bin"));
        assert_eq!(config.paths.float_weights, PathBuf::from("assets/weights.bin"));
        assert_eq!(config.calibration.mode, ModeArg::Shift);
    }

    #[test]
    fn test_config_serialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w8pack.toml");
        let mut config = W8packConfig::default();
        config.paths.layer_table = Some(PathBuf::from("tables/yolo.toml"));
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(W8packConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        assert!(W8packConfig::resolve(Some(Path::new("/nonexistent/w8pack.toml"))).is_err());
    }
}
