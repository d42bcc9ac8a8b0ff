//! Config command - View and manage KDrive configuration
//!
//! Provides the `kdrive config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Validates the configuration file and reports every problem
//! 3. Prints the configuration file path
//! 4. Writes a starter configuration file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use kdrive_core::config::{Config, ConfigBuilder};

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
    /// Write a starter configuration file
    Init {
        /// Local directory to keep in sync
        #[arg(long)]
        working_directory: Option<PathBuf>,
        /// Bucket to mirror
        #[arg(long)]
        bucket: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
            ConfigCommand::Path => execute_path(config_path, format),
            ConfigCommand::Init {
                working_directory,
                bucket,
                force,
            } => execute_init(
                config_path,
                working_directory.clone(),
                bucket.clone(),
                *force,
                format,
            ),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format.is_json());
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");
        let yaml = config
            .to_yaml()
            .context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format.is_json());

    // Load explicitly; defaults would hide a missing or broken file
    let config = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let message = if config_path.exists() {
                format!("Failed to parse configuration: {e}")
            } else {
                "Configuration file not found".to_string()
            };
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", config_path.display()));
                formatter.info("Run 'kdrive config init' to create one.");
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    Ok(())
}

fn execute_path(config_path: &Path, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        get_formatter(true).print_json(&serde_json::json!({
            "config_path": config_path.display().to_string(),
            "exists": config_path.exists(),
        }));
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}

fn execute_init(
    config_path: &Path,
    working_directory: Option<PathBuf>,
    bucket: Option<String>,
    force: bool,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format.is_json());

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            config_path.display()
        );
    }

    let config = starter_config(working_directory, bucket);
    config
        .save(config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    info!(config_path = %config_path.display(), "Wrote starter configuration");

    let remaining = config.validate();
    if format.is_json() {
        let fields: Vec<&str> = remaining.iter().map(|e| e.field.as_str()).collect();
        formatter.print_json(&serde_json::json!({
            "success": true,
            "config_path": config_path.display().to_string(),
            "fields_to_complete": fields,
        }));
    } else {
        formatter.success(&format!("Wrote {}", config_path.display()));
        for error in &remaining {
            formatter.info(&format!("Still to set: {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn starter_config(working_directory: Option<PathBuf>, bucket: Option<String>) -> Config {
    let mut builder = ConfigBuilder::new();
    if let Some(dir) = working_directory {
        builder = builder.working_directory(dir);
    }
    if let Some(bucket) = bucket {
        builder = builder.bucket_name(bucket);
    }
    builder.build()
}
