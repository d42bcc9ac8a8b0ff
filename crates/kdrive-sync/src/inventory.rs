//! Inventory listers and reconciliation
//!
//! Each lister has two entry points:
//!
//! - `try_list` reports listing failures to the caller. The poller and the
//!   reconciler use it so a failed listing is never mistaken for an empty
//!   side.
//! - `list` logs the failure and returns an empty [`Inventory`]. Callers of
//!   the lenient form must treat an empty result as "empty or unknown".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use kdrive_core::domain::{BucketName, Filename, Inventory, SyncDiff};
use kdrive_core::ports::{IObjectStore, StoreError};

use crate::filesystem::is_temp_artifact;
use crate::SyncError;

// ============================================================================
// LocalLister
// ============================================================================

/// Lists the regular files directly inside the working directory
#[derive(Debug, Clone)]
pub struct LocalLister {
    dir: PathBuf,
}

impl LocalLister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists the directory, skipping subdirectories, download temp files
    /// and names that are not valid flat filenames
    pub async fn try_list(&self) -> std::io::Result<Inventory> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut inventory = Inventory::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !file_type.is_file() {
                continue;
            }

            let raw = entry.file_name();
            let Some(raw) = raw.to_str() else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 filename");
                continue;
            };
            if is_temp_artifact(raw) {
                continue;
            }
            match Filename::new(raw) {
                Ok(name) => {
                    inventory.insert(name);
                }
                Err(e) => debug!(name = raw, error = %e, "Skipping invalid filename"),
            }
        }

        Ok(inventory)
    }

    /// Lenient listing: logs failures and returns an empty inventory
    pub async fn list(&self) -> Inventory {
        match self.try_list().await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Local listing failed");
                Inventory::new()
            }
        }
    }
}

// ============================================================================
// RemoteLister
// ============================================================================

/// Lists the keys of the configured bucket
#[derive(Clone)]
pub struct RemoteLister {
    store: Arc<dyn IObjectStore>,
    bucket: BucketName,
}

impl RemoteLister {
    pub fn new(store: Arc<dyn IObjectStore>, bucket: BucketName) -> Self {
        Self { store, bucket }
    }

    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    /// Lists the bucket; keys that are not flat filenames are skipped
    pub async fn try_list(&self) -> Result<Inventory, StoreError> {
        let keys = self.store.list(&self.bucket).await?;
        let total = keys.len();

        let inventory: Inventory = keys
            .into_iter()
            .filter_map(|key| match Filename::new(key.as_str()) {
                Ok(name) => Some(name),
                Err(_) => {
                    debug!(key = %key, "Skipping key outside the flat namespace");
                    None
                }
            })
            .collect();

        if inventory.len() != total {
            debug!(
                bucket = %self.bucket,
                total,
                kept = inventory.len(),
                "Ignored remote keys that are not flat filenames"
            );
        }
        Ok(inventory)
    }

    /// Lenient listing: logs failures and returns an empty inventory
    pub async fn list(&self) -> Inventory {
        match self.try_list().await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!(
                    bucket = %self.bucket,
                    provider = self.store.provider_name(),
                    error = %e,
                    "Remote listing failed"
                );
                Inventory::new()
            }
        }
    }
}

impl std::fmt::Debug for RemoteLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLister")
            .field("provider", &self.store.provider_name())
            .field("bucket", &self.bucket)
            .finish()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Computes one reconciliation pass over both sides
#[derive(Debug, Clone)]
pub struct Reconciler {
    local: LocalLister,
    remote: RemoteLister,
}

impl Reconciler {
    pub fn new(local: LocalLister, remote: RemoteLister) -> Self {
        Self { local, remote }
    }

    /// Lists both sides and returns what each is missing
    ///
    /// Fails if either listing fails; a pass never runs against a side it
    /// could not see.
    #[instrument(skip(self), fields(bucket = %self.remote.bucket()))]
    pub async fn reconcile(&self) -> Result<SyncDiff, SyncError> {
        let remote = self.remote.try_list().await?;
        let local = self.local.try_list().await?;
        let diff = SyncDiff::between(&local, &remote);

        debug!(
            local = local.len(),
            remote = remote.len(),
            missing_locally = diff.missing_locally.len(),
            missing_in_cloud = diff.missing_in_cloud.len(),
            "Reconciliation pass complete"
        );
        Ok(diff)
    }
}
