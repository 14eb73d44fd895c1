//! Utils - Common Utilities for CLI Commands
//!
//! Shared utility functions used across CLI commands.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use w8pack_quant::LayerTable;
use w8pack_serialize::{detect_format, ContainerFormat};

use crate::cli::FormatArg;
use crate::config::W8packConfig;
use crate::error::CliResult;

static QUIET: AtomicBool = AtomicBool::new(false);

// =============================================================================
// Output Formatting
// =============================================================================

/// Silence status output (`-q`)
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print a success message
pub fn print_success(message: &str) {
    if !quiet() {
        println!("{} {}", "✓".green().bold(), message);
    }
}

/// Print an info message
pub fn print_info(message: &str) {
    if !quiet() {
        println!("{} {}", "ℹ".blue().bold(), message);
    }
}

/// Print a warning message (stderr, shown even with `-q`)
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print a header
pub fn print_header(title: &str) {
    if !quiet() {
        println!();
        println!("{}", title.bold().underline());
        println!();
    }
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    if !quiet() {
        println!("  {}: {}", key.dimmed(), value);
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

// =============================================================================
// Argument Resolution
// =============================================================================

/// Explicit path or the configured default
pub fn path_or(explicit: Option<PathBuf>, default: &Path) -> PathBuf {
    explicit.unwrap_or_else(|| default.to_path_buf())
}

/// Explicit variant or the one implied by the file name
pub fn resolve_format(path: &Path, explicit: Option<FormatArg>) -> ContainerFormat {
    explicit.map_or_else(|| detect_format(path), ContainerFormat::from)
}

/// Layer table from `--layers`, the config file, or the built-in default
pub fn load_layer_table(explicit: Option<&Path>, config: &W8packConfig) -> CliResult<LayerTable> {
    match explicit.or(config.paths.layer_table.as_deref()) {
        Some(path) => Ok(LayerTable::load(path)?),
        None => Ok(LayerTable::yolov5n()),
    }
}

/// File name for messages
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Lowercased file extension
pub fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

// =============================================================================
// Tests
// =============================================================================
