//! KDrive CLI - Command-line interface for KDrive
//!
//! Provides commands for:
//! - Running the sync engine in the foreground
//! - Showing what a reconciliation pass would transfer
//! - Viewing, validating and creating the configuration file

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kdrive_core::config::{Config, LoggingConfig};

mod commands;
mod output;

use commands::{config::ConfigCommand, diff::DiffCommand, run::RunCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "kdrive",
    version,
    about = "Keeps a local directory in sync with a cloud bucket"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the sync engine until interrupted
    Run(RunCommand),
    /// Show what one reconciliation pass would transfer
    Diff(DiffCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Builds the filter directive used when `RUST_LOG` is not set
fn filter_directive(logging: &LoggingConfig, verbose: u8, quiet: bool) -> String {
    if quiet {
        return "warn".to_string();
    }
    match verbose {
        0 => logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: u8, quiet: bool) {
    let directive = filter_directive(logging, verbose, quiet);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    // Logs go to stderr; stdout carries command output and status lines
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let logging = Config::load_or_default(&config_path).logging;
    init_tracing(&logging, cli.verbose, cli.quiet);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Run(cmd) => cmd.execute(&config_path, format).await,
        Commands::Diff(cmd) => cmd.execute(&config_path, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
