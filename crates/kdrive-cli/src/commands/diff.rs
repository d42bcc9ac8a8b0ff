//! Diff command - Show what one reconciliation pass would transfer
//!
//! Lists both sides once and prints the files missing locally (would be
//! downloaded) and missing in the bucket (would be uploaded). Nothing is
//! transferred.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use kdrive_core::config::Config;
use kdrive_core::domain::{Filename, SyncDiff};
use kdrive_store::build_store;
use kdrive_sync::inventory::{LocalLister, Reconciler, RemoteLister};
use kdrive_sync::SyncSettings;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct DiffCommand {}

impl DiffCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());

        let config = Config::load(config_path).with_context(|| {
            format!("Failed to load configuration from {}", config_path.display())
        })?;
        let settings = SyncSettings::from_config(&config)?;
        let store = build_store(&config.storage)
            .await
            .context("Failed to build object store")?;

        let reconciler = Reconciler::new(
            LocalLister::new(settings.working_directory.clone()),
            RemoteLister::new(store, settings.bucket.clone()),
        );
        let diff = reconciler
            .reconcile()
            .await
            .context("Reconciliation pass failed")?;

        info!(
            missing_locally = diff.missing_locally.len(),
            missing_in_cloud = diff.missing_in_cloud.len(),
            "Computed diff"
        );

        if format.is_json() {
            formatter.print_json(&diff_json(&diff));
        } else {
            print_human(formatter.as_ref(), &diff);
        }
        Ok(())
    }
}

fn names(list: &[Filename]) -> Vec<String> {
    list.iter().map(|n| n.to_string()).collect()
}

fn diff_json(diff: &SyncDiff) -> serde_json::Value {
    serde_json::json!({
        "converged": diff.is_converged(),
        "missing_locally": names(&diff.missing_locally),
        "missing_in_cloud": names(&diff.missing_in_cloud),
    })
}

fn print_human(formatter: &dyn OutputFormatter, diff: &SyncDiff) {
    if diff.is_converged() {
        formatter.success("Working directory and bucket are in sync");
        return;
    }

    if !diff.missing_locally.is_empty() {
        formatter.info(&format!(
            "Would download ({}):",
            diff.missing_locally.len()
        ));
        for name in &diff.missing_locally {
            formatter.info(&format!("  \u{2193} {name}"));
        }
    }
    if !diff.missing_in_cloud.is_empty() {
        formatter.info(&format!(
            "Would upload ({}):",
            diff.missing_in_cloud.len()
        ));
        for name in &diff.missing_in_cloud {
            formatter.info(&format!("  \u{2191} {name}"));
        }
    }
}
