//! w8pack CLI - Weight Preparation for the INT8 Convolution Accelerator
//!
//! The main entry point for the w8pack command-line tool.
//!
//! # Commands
//! - `w8pack quantize` - Float container to typed INT8 container
//! - `w8pack repack` - Convolution weights to accelerator read order
//! - `w8pack calibrate` - Per-layer requantization multipliers or shifts
//! - `w8pack inspect` - List the tensors of a container
//! - `w8pack verify` - Check a typed container against its float source
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// CLI-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};
use config::W8packConfig;
use error::CliResult;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for generated artifacts.
fn init_logging(cli: &Cli) {
    let default_filter = if cli.verbose {
        "w8pack=debug,w8pack_serialize=debug,w8pack_quant=debug"
    } else if cli.quiet {
        "error"
    } else {
        // Library warnings are repeated as CLI diagnostics
        "w8pack=warn,w8pack_serialize=error,w8pack_quant=error"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn run(cli: Cli) -> CliResult<()> {
    commands::utils::set_quiet(cli.quiet);
    let config = W8packConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Quantize(args) => commands::quantize::execute(args, &config),
        Commands::Repack(args) => commands::repack::execute(args, &config),
        Commands::Calibrate(args) => commands::calibrate::execute(args, &config),
        Commands::Inspect(args) => commands::inspect::execute(args),
        Commands::Verify(args) => commands::verify::execute(args, &config),
    }
}
