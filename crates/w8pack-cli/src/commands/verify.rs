//! Verify - Typed Container Check
//!
//! Re-quantizes the float source and compares it with an existing typed
//! container: scales must match bit for bit, values exactly, and every
//! non-weight tensor must pass through unchanged.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use w8pack_quant::{compute_quantization_stats, quantize_tensor, QuantizedTensor};
use w8pack_serialize::{load_container, Container, ContainerFormat, TensorData, TensorRecord};

use super::utils::{load_layer_table, path_or, print_header, print_kv, print_success, print_warning};
use crate::cli::VerifyArgs;
use crate::config::W8packConfig;
use crate::error::{CliError, CliResult};

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `verify` command
pub fn execute(args: VerifyArgs, config: &W8packConfig) -> CliResult<()> {
    let float_path = path_or(args.float_path, &config.paths.float_weights);
    let typed_path = path_or(args.quantized_path, &config.paths.typed_weights);
    let table = load_layer_table(args.layers.as_deref(), config)?;

    print_header("Quantization Check");
    print_kv("Float", &float_path.display().to_string());
    print_kv("Typed", &typed_path.display().to_string());

    let float = load_container(&float_path, ContainerFormat::Float)?;
    let typed = load_container(&typed_path, ContainerFormat::Typed)?;

    let report = compare(&float, &typed, &table.weight_suffix)?;
    for problem in &report.problems {
        print_warning(problem);
    }

    print_kv("Weights checked", &report.weights.to_string());
    print_kv("Passed through", &report.passthrough.to_string());
    print_kv("Worst RMSE", &format!("{:.6e}", report.worst_rmse));
    print_kv("Worst abs error", &format!("{:.6e}", report.worst_max_error));

    if !report.problems.is_empty() {
        return Err(CliError::Verification(format!(
            "{} mismatch(es) between {} and {}",
            report.problems.len(),
            float_path.display(),
            typed_path.display()
        )));
    }
    print_success("Typed container matches a fresh quantization");
    Ok(())
}

// =============================================================================
// Comparison
// =============================================================================

#[derive(Debug, Default)]
struct VerifyReport {
    weights: usize,
    passthrough: usize,
    worst_rmse: f32,
    worst_max_error: f32,
    problems: Vec<String>,
}

fn compare(float: &Container, typed: &Container, weight_suffix: &str) -> CliResult<VerifyReport> {
    let mut report = VerifyReport::default();

    if float.len() != typed.len() {
        report.problems.push(format!(
            "tensor count differs: {} float, {} typed",
            float.len(),
            typed.len()
        ));
    }

    for (index, source) in float.iter().enumerate() {
        let Some(stored) = typed.records().get(index) else {
            break;
        };
        if stored.key() != source.key() {
            report.problems.push(format!(
                "tensor {index}: key {:?} stored as {:?}",
                source.key(),
                stored.key()
            ));
            continue;
        }

        if source.has_suffix(weight_suffix) && source.scale().is_none() {
            report.weights += 1;
            check_weight(source, stored, &mut report)?;
        } else {
            report.passthrough += 1;
            if source != stored {
                report
                    .problems
                    .push(format!("{}: pass-through tensor changed", source.key()));
            }
        }
    }
    Ok(report)
}

fn check_weight(
    source: &TensorRecord,
    stored: &TensorRecord,
    report: &mut VerifyReport,
) -> CliResult<()> {
    let expected = quantize_tensor(source)?;
    let Some(actual) = QuantizedTensor::from_record(stored) else {
        report
            .problems
            .push(format!("{}: stored as {}, expected i8", stored.key(), stored.dtype()));
        return Ok(());
    };

    if actual.shape != expected.shape {
        report.problems.push(format!(
            "{}: shape {:?}, expected {:?}",
            stored.key(),
            actual.shape,
            expected.shape
        ));
        return Ok(());
    }
    if actual.scale.to_bits() != expected.scale.to_bits() {
        report.problems.push(format!(
            "{}: scale {:e}, expected {:e}",
            stored.key(),
            actual.scale,
            expected.scale
        ));
    }
    if let Some(pos) = actual
        .values
        .iter()
        .zip(&expected.values)
        .position(|(a, e)| a != e)
    {
        report.problems.push(format!(
            "{}: element {pos} is {}, expected {}",
            stored.key(),
            actual.values[pos],
            expected.values[pos]
        ));
    }

    if let TensorData::Float32(original) = source.data() {
        let stats = compute_quantization_stats(original, &actual);
        report.worst_rmse = report.worst_rmse.max(stats.rmse);
        report.worst_max_error = report.worst_max_error.max(stats.max_error);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
