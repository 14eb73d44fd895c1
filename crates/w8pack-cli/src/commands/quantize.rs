//! Quantize - Weight Quantization Command
//!
//! Reads a float container, quantizes every weight tensor to symmetric INT8
//! and writes the typed container. Other tensors pass through unchanged.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use w8pack_quant::quantize_container;
use w8pack_serialize::{collect_scales, load_container, save_container, save_scales, ContainerFormat};

use super::utils::{
    format_size, load_layer_table, path_or, print_header, print_info, print_kv, print_success,
};
use crate::cli::QuantizeArgs;
use crate::config::W8packConfig;
use crate::error::CliResult;

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `quantize` command
pub fn execute(args: QuantizeArgs, config: &W8packConfig) -> CliResult<()> {
    let input = path_or(args.input, &config.paths.float_weights);
    let output = path_or(args.output, &config.paths.typed_weights);
    let table = load_layer_table(args.layers.as_deref(), config)?;

    print_header("Weight Quantization");
    print_kv("Input", &input.display().to_string());
    print_kv("Output", &output.display().to_string());
    print_kv("Weight suffix", &table.weight_suffix);

    let weights = load_container(&input, ContainerFormat::Float)?;
    print_info(&format!("Loaded {} tensors", weights.len()));

    let typed = quantize_container(&weights, &table.weight_suffix)?;
    tracing::debug!(output = %output.display(), "{}", typed.summary());
    save_container(&typed, &output, ContainerFormat::Typed)?;

    let quantized = typed.int8_count();
    print_kv("Quantized", &quantized.to_string());
    print_kv("Passed through", &(typed.len() - quantized).to_string());
    print_kv("Data before", &format_size(weights.data_bytes() as u64));
    print_kv("Data after", &format_size(typed.data_bytes() as u64));

    if let Some(scales_path) = args.out_scales {
        let scales = collect_scales(&typed);
        save_scales(&scales, &scales_path)?;
        print_info(&format!(
            "Wrote {} scales to {}",
            scales.len(),
            scales_path.display()
        ));
    }

    print_success(&format!("Wrote {}", output.display()));
    Ok(())
}
