//! Calibrate - Layer Constant Generation Command
//!
//! Derives the per-layer requantization multipliers or shifts from the
//! weight scales and writes them as a C header, plain assignments or JSON.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::io::Write;
use std::path::Path;

use w8pack_quant::{calibrate, CalibrationMode, CalibrationTable, FallbackReason, QuantError};
use w8pack_serialize::{load_container, write_atomic, ContainerFormat};

use super::utils::{
    display_name, get_extension, load_layer_table, path_or, print_header, print_kv,
    print_success, print_warning, resolve_format,
};
use crate::cli::{CalibrateArgs, StyleArg};
use crate::config::W8packConfig;
use crate::error::{CliError, CliResult};

/// Output path meaning stdout.
const STDOUT_PATH: &str = "-";

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `calibrate` command
pub fn execute(args: CalibrateArgs, config: &W8packConfig) -> CliResult<()> {
    let input = path_or(args.input, &config.paths.typed_weights);
    let output = path_or(args.output, &config.paths.layers_header);
    let to_stdout = output.as_os_str() == STDOUT_PATH;
    let format = resolve_format(&input, args.format);
    if format == ContainerFormat::Repacked {
        return Err(CliError::InvalidArgument(
            "calibration needs a float or typed container, the repacked variant has no scales"
                .to_string(),
        ));
    }
    let mode: CalibrationMode = args.mode.unwrap_or(config.calibration.mode).into();
    let deny_degenerate = args.deny_degenerate || config.calibration.deny_degenerate;
    let style = args.style.unwrap_or_else(|| default_style(&output, to_stdout));
    let table = load_layer_table(args.layers.as_deref(), config)?;

    if !to_stdout {
        print_header("Layer Calibration");
        print_kv("Input", &format!("{} ({format})", input.display()));
        print_kv("Mode", mode.name());
        print_kv(
            "Layers",
            &format!(
                "{} ({}, {} weight keys)",
                table.len(),
                table.name,
                table.distinct_keys().len()
            ),
        );
    }

    let container = load_container(&input, format)?;
    let source = match format {
        ContainerFormat::Float => format!("{} (FP32, Scale_W = max|w| / 127)", display_name(&input)),
        _ => display_name(&input),
    };
    let result = calibrate(&container, &table, mode, source);

    report_diagnostics(&result, deny_degenerate);
    if deny_degenerate {
        result.check_degenerate()?;
    }

    let rendered = render(&result, style)?;
    if to_stdout {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        stdout.flush()?;
    } else {
        write_atomic(&output, rendered.as_bytes())?;
        print_kv("Distinct values", &result.distinct_values().to_string());
        print_kv("Fallbacks", &result.fallback_count().to_string());
        print_success(&format!("Wrote {}", output.display()));
    }
    Ok(())
}

fn default_style(output: &Path, to_stdout: bool) -> StyleArg {
    if to_stdout {
        return StyleArg::Assignments;
    }
    match get_extension(output).as_deref() {
        Some("h" | "hpp") => StyleArg::Header,
        Some("json") => StyleArg::Json,
        _ => StyleArg::Assignments,
    }
}

fn render(result: &CalibrationTable, style: StyleArg) -> CliResult<String> {
    Ok(match style {
        StyleArg::Assignments => result.render_assignments(),
        StyleArg::Header => result.render_c_header(),
        StyleArg::Json => {
            let mut json = serde_json::to_string_pretty(result)?;
            json.push('\n');
            json
        }
    })
}

/// Prints every fallback. The degenerate-run warning is left to the caller
/// when it is about to fail on it.
fn report_diagnostics(result: &CalibrationTable, deny_degenerate: bool) {
    for entry in &result.entries {
        if entry.fallback == Some(FallbackReason::InvalidScale) {
            print_warning(&format!(
                "layer {} ({}): scale is not positive, using default {}",
                entry.layer, entry.key, entry.value
            ));
        }
    }
    for diagnostic in result.diagnostics() {
        match diagnostic {
            QuantError::DegenerateCalibration { .. } if deny_degenerate => {}
            QuantError::DegenerateCalibration { .. } => print_warning(&format!(
                "{diagnostic}; check that the input carries per-layer scales"
            )),
            other => print_warning(&other.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
