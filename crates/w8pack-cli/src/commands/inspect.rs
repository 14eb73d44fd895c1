//! Inspect - Container Inspection Command
//!
//! Lists the tensors of a float, typed or repacked container.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::path::Path;

use serde::Serialize;
use w8pack_serialize::{load_container, load_repacked, Container, ContainerFormat, RepackedContainer};

use super::utils::{format_size, print_header, print_kv, resolve_format};
use crate::cli::InspectArgs;
use crate::error::CliResult;

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `inspect` command
pub fn execute(args: InspectArgs) -> CliResult<()> {
    let format = resolve_format(&args.input, args.format);
    let report = if format.has_metadata() {
        container_report(&args.input, format, &load_container(&args.input, format)?)
    } else {
        repacked_report(&args.input, &load_repacked(&args.input)?)
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output_text(&report);
    }
    Ok(())
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Serialize)]
struct InspectReport {
    path: String,
    format: &'static str,
    tensors: usize,
    data_bytes: usize,
    entries: Vec<EntryInfo>,
}

#[derive(Debug, Serialize)]
struct EntryInfo {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shape: Option<Vec<u32>>,
    dtype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<f32>,
    bytes: usize,
}

fn container_report(path: &Path, format: ContainerFormat, container: &Container) -> InspectReport {
    let entries = container
        .iter()
        .map(|r| EntryInfo {
            key: r.key().to_string(),
            shape: Some(r.shape().to_vec()),
            dtype: r.dtype().to_string(),
            scale: r.scale(),
            bytes: r.data().byte_len(),
        })
        .collect();
    InspectReport {
        path: path.display().to_string(),
        format: format.name(),
        tensors: container.len(),
        data_bytes: container.data_bytes(),
        entries,
    }
}

fn repacked_report(path: &Path, container: &RepackedContainer) -> InspectReport {
    let entries = container
        .iter()
        .map(|e| EntryInfo {
            key: e.key.clone(),
            shape: None,
            dtype: "blob".to_string(),
            scale: None,
            bytes: e.blob.len(),
        })
        .collect();
    InspectReport {
        path: path.display().to_string(),
        format: ContainerFormat::Repacked.name(),
        tensors: container.len(),
        data_bytes: container.blob_bytes(),
        entries,
    }
}

// =============================================================================
// Text Output
// =============================================================================

fn output_text(report: &InspectReport) {
    print_header(&format!("Container: {}", report.path));
    print_kv("Format", report.format);
    print_kv("Tensors", &report.tensors.to_string());
    print_kv("Data", &format_size(report.data_bytes as u64));
    println!();

    println!(
        "{:<40} {:<20} {:<6} {:<14} {:>10}",
        "Key", "Shape", "Type", "Scale", "Bytes"
    );
    println!("{}", "-".repeat(94));
    for entry in &report.entries {
        println!(
            "{:<40} {:<20} {:<6} {:<14} {:>10}",
            truncate(&entry.key, 39),
            entry.shape.as_deref().map_or_else(|| "-".to_string(), format_shape),
            entry.dtype,
            entry.scale.map_or_else(|| "-".to_string(), |s| format!("{s:.6e}")),
            entry.bytes,
        );
    }
}

fn format_shape(shape: &[u32]) -> String {
    let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("[{}]", dims.join(", "))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

// =============================================================================
// Tests
// =============================================================================
