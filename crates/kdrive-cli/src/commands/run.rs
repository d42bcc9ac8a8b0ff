//! Run command - Keep the working directory and bucket in sync
//!
//! Provides the `kdrive run` CLI command which:
//! 1. Loads and validates the configuration
//! 2. Builds the configured object store
//! 3. Starts the sync engine with the native file watcher
//! 4. Renders every status record until SIGINT/SIGTERM, then shuts the
//!    engine down within the configured grace period

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use kdrive_core::config::Config;
use kdrive_store::build_store;
use kdrive_sync::watcher::FileWatcher;
use kdrive_sync::{CloudState, SyncOrchestrator, SyncSettings};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Skip the reconciliation pass at startup
    #[arg(long)]
    pub no_initial_reconcile: bool,

    /// Seconds between cloud polls (overrides sync.poll_interval)
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

impl RunCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());

        let mut config = Config::load(config_path).with_context(|| {
            format!(
                "Failed to load configuration from {}. Run 'kdrive config init' to create one.",
                config_path.display()
            )
        })?;
        self.apply_overrides(&mut config);

        let settings = match SyncSettings::from_config(&config) {
            Ok(settings) => settings,
            Err(e) => {
                formatter.error(&format!("Invalid configuration: {e}"));
                return Err(e.into());
            }
        };

        let store = build_store(&config.storage)
            .await
            .context("Failed to build object store")?;
        info!(
            provider = store.provider_name(),
            config_path = %config_path.display(),
            "Object store ready"
        );

        formatter.success(&format!(
            "Syncing {} with bucket '{}' (Ctrl+C to stop)",
            settings.working_directory.display(),
            settings.bucket
        ));

        let (status_tx, mut status_rx) = mpsc::channel(settings.status_channel_capacity);
        let shutdown = CancellationToken::new();
        tokio::spawn(shutdown_signal(shutdown.clone()));

        let handle = SyncOrchestrator::from_settings(settings, store, Arc::new(FileWatcher::new()))
            .start(status_tx, shutdown.clone());

        // Renders until every engine-side sender is gone
        let renderer = tokio::spawn(async move {
            let formatter = get_formatter(format.is_json());
            while let Some(info) = status_rx.recv().await {
                formatter.sync_event(&info);
            }
        });

        let mut cloud = handle.cloud_state_changes();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = cloud.changed() => {
                    if changed.is_err() {
                        // Poller is gone; only the signal can end the run now
                        shutdown.cancelled().await;
                        break;
                    }
                    let state = cloud.borrow_and_update().clone();
                    report_cloud_state(formatter.as_ref(), &state);
                }
            }
        }

        let drop_counter = handle.status_drop_counter();
        let clean = handle.join().await;
        let dropped = drop_counter.get();
        if let Err(e) = renderer.await {
            error!(error = %e, "Status renderer failed");
        }

        if dropped > 0 {
            formatter.warn(&format!("{dropped} status events were dropped"));
        }
        if clean {
            formatter.success("Stopped");
        } else {
            formatter.warn("Stopped; some transfers were aborted");
        }
        Ok(())
    }

    fn apply_overrides(&self, config: &mut Config) {
        if self.no_initial_reconcile {
            config.sync.initial_reconcile = false;
        }
        if let Some(seconds) = self.poll_interval {
            config.sync.poll_interval = seconds;
        }
    }
}

fn report_cloud_state(formatter: &dyn OutputFormatter, state: &CloudState) {
    match state {
        CloudState::Starting => {}
        CloudState::Online => formatter.info("Cloud connection online"),
        CloudState::Degraded(reason) => {
            formatter.warn(&format!("Cloud listing failed, retrying next tick: {reason}"))
        }
        CloudState::Disabled(reason) => formatter.error(&format!(
            "Cloud unreachable, polling disabled (local changes are still uploaded): {reason}"
        )),
    }
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}
