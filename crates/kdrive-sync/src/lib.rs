//! KDrive Sync - Sync reconciliation engine
//!
//! Keeps a local working directory and a remote bucket in agreement:
//! local creates and writes are pushed to the bucket, objects missing
//! locally are pulled down, and every transfer reports its lifecycle on a
//! status channel.
//!
//! ## Architecture
//!
//! ```text
//!  LocalChangeWatcher ──┐                            ┌──► StatusPublisher ──► status sink
//!                       ├──► TransferDispatcher ──► TransferExecutor
//!  CloudPoller ─────────┘    (semaphore + in-flight)  └──► IObjectStore / working directory
//! ```
//!
//! ## Modules
//!
//! - [`settings`] - Validated engine settings derived from configuration
//! - [`filesystem`] - Working-directory helpers (atomic writes, temp artifacts)
//! - [`inventory`] - Local and remote listers, one-shot reconciliation
//! - [`watcher`] - Filesystem change notifier and the upload-trigger loop
//! - [`poller`] - Interval-driven download-trigger loop with connectivity state
//! - [`transfer`] - Single upload/download with retry and status emission
//! - [`dispatcher`] - Bounded, per-filename-deduplicated transfer dispatch
//! - [`status`] - Status channel publisher with a block-with-timeout policy
//! - [`orchestrator`] - Engine lifecycle and cancellation

pub mod dispatcher;
pub mod filesystem;
pub mod inventory;
pub mod orchestrator;
pub mod poller;
pub mod settings;
pub mod status;
pub mod transfer;
pub mod watcher;

use thiserror::Error;

use kdrive_core::config::ConfigError;
use kdrive_core::ports::StoreError;

pub use orchestrator::{start_sync_client, SyncHandle, SyncOrchestrator};
pub use poller::CloudState;
pub use settings::SyncSettings;

/// Errors that can stop the engine or a reconciliation pass
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configuration cannot be used to start the engine
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The object store rejected a listing or transfer
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error occurred in the working directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
