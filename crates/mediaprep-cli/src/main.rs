// MediaPrep - Client-side media preprocessing
// Copyright (C) 2025 MediaPrep Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! `mediaprep`: compress media before upload

mod commands;
mod output;
mod progress;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use commands::*;
use mediaprep_config::{Config, ConfigLoader};
use mediaprep_observability::{init_tracing_with_config, LogConfig, LogFormat};
use std::io;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mediaprep")]
#[command(version, about = "Compress images and videos below an upload budget")]
#[command(
    long_about = "MediaPrep shrinks media before it is uploaded: images are downscaled and
re-encoded as JPEG, videos are planned against a bitrate policy and re-recorded."
)]
#[command(propagate_version = true)]
#[command(author = "MediaPrep Contributors")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Colored output
    #[arg(long, global = true, value_name = "WHEN", value_enum, default_value_t = ColorWhen::Auto)]
    color: ColorWhen,

    /// Log format (pretty, compact, json); overrides the configuration file
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Configuration file (toml, yaml or json)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorWhen {
    Always,
    Auto,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress images below a size budget
    Image(ImageCmd),

    /// Show how videos would be compressed
    Plan(PlanCmd),

    /// Print the effective configuration
    Config(ConfigCmd),

    /// Show version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.color {
        ColorWhen::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        ColorWhen::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        ColorWhen::Auto => {}
    }
    output::set_quiet(cli.quiet);

    let result = run(cli).await;

    if let Err(e) = result {
        output::error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigLoader::new()
        .load_with_overrides(cli.config.as_deref())
        .await
        .context("cannot load configuration")?;
    init_logging(&cli, &config)?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Image(cmd) => cmd.execute(&config, &token, cli.quiet).await,
        Commands::Plan(cmd) => cmd.execute(&config).await,
        Commands::Config(cmd) => cmd.execute(&config),
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let format: LogFormat = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.observability.log_format)
        .parse()?;

    // RUST_LOG wins over the configured level unless a flag asks otherwise
    let fallback = std::env::var_os("RUST_LOG")
        .is_none()
        .then_some(config.observability.log_level.as_str());
    let log = LogConfig::new()
        .with_format(format)
        .with_color(console::colors_enabled_stderr())
        .with_targets(false)
        .with_verbosity(cli.verbose, cli.quiet, fallback);

    init_tracing_with_config(log).ok(); // Ignore errors if already initialized
    Ok(())
}

fn print_version() {
    println!("mediaprep {}", env!("CARGO_PKG_VERSION"));
    println!("rust-version: {}", env!("CARGO_PKG_RUST_VERSION"));
    println!("license: {}", env!("CARGO_PKG_LICENSE"));
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mediaprep", &mut io::stdout());
}
