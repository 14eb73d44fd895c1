//! Repack - Accelerator Layout Command
//!
//! Repacks the convolution weights of a float or typed container into the
//! accelerator's read order, optionally with the matching INT32 biases.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use w8pack_quant::{repack_biases, repack_container};
use w8pack_serialize::{load_container, save_repacked, ContainerFormat};

use super::utils::{
    format_size, load_layer_table, path_or, print_header, print_info, print_kv, print_success,
    resolve_format,
};
use crate::cli::RepackArgs;
use crate::config::W8packConfig;
use crate::error::{CliError, CliResult};

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `repack` command
pub fn execute(args: RepackArgs, config: &W8packConfig) -> CliResult<()> {
    let input = path_or(args.input, &config.paths.typed_weights);
    let output = path_or(args.output, &config.paths.repacked_weights);
    let format = resolve_format(&input, args.format);
    if format == ContainerFormat::Repacked {
        return Err(CliError::InvalidArgument(format!(
            "{} is already a repacked-blob container",
            input.display()
        )));
    }
    let table = load_layer_table(args.layers.as_deref(), config)?;

    print_header("Accelerator Repack");
    print_kv("Input", &format!("{} ({format})", input.display()));
    print_kv("Output", &output.display().to_string());

    let container = load_container(&input, format)?;
    if format == ContainerFormat::Float {
        print_info("Float input: weights are quantized before repacking");
    }

    let repacked = repack_container(&container, &table.weight_suffix)?;
    tracing::debug!(blobs = repacked.len(), bytes = repacked.blob_bytes(), "repacked weights");
    save_repacked(&repacked, &output)?;

    print_kv("Repacked", &repacked.len().to_string());
    print_kv("Skipped", &(container.len() - repacked.len()).to_string());
    print_kv("Blob data", &format_size(repacked.blob_bytes() as u64));

    if let Some(bias_path) = args.bias_out {
        let biases = repack_biases(&container, &table.weight_suffix)?;
        save_repacked(&biases, &bias_path)?;
        print_info(&format!(
            "Wrote {} biases to {}",
            biases.len(),
            bias_path.display()
        ));
    }

    print_success(&format!("Wrote {}", output.display()));
    Ok(())
}
