//! Transfer executor
//!
//! Performs one upload or one download and reports its lifecycle on the
//! status channel:
//!
//! - **Upload**: stat the local file, emit `Local/Uploading`, read it, put
//!   it, emit `Cloud/Synced`. A file that cannot be stat'ed is logged and
//!   skipped without any status record.
//! - **Download**: emit `Cloud/Downloading`, get the object, write it
//!   atomically into the working directory, emit `Local/Synced` with the
//!   remote last-modified time.
//!
//! Transient store failures are retried with bounded exponential backoff.
//! Once a transfer has announced itself, it always ends with either a
//! `Synced` or a `Failed` record.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use kdrive_core::config::RetryConfig;
use kdrive_core::domain::{BucketName, FileLocation, Filename, SyncInfo};
use kdrive_core::ports::{IObjectStore, StoreError};

use crate::filesystem::{modified_time, read_file, write_atomic};
use crate::status::StatusPublisher;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounded exponential backoff for transient store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub base_delay: Duration,
    /// Cap on any single wait
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait before the attempt following failed attempt number `failed` (1-based)
    pub fn delay_after(&self, failed: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs `f` until it succeeds, fails permanently, or runs out of attempts
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    f: F,
) -> Result<T, StoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// TransferJob / TransferError
// ============================================================================

/// One unit of transfer work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransferJob {
    /// Push the local file to the bucket
    Upload(Filename),
    /// Pull the object into the working directory
    Download(Filename),
}

impl TransferJob {
    pub fn filename(&self) -> &Filename {
        match self {
            TransferJob::Upload(name) | TransferJob::Download(name) => name,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, TransferJob::Upload(_))
    }

    /// Side the content is copied from
    pub fn source(&self) -> FileLocation {
        match self {
            TransferJob::Upload(_) => FileLocation::Local,
            TransferJob::Download(_) => FileLocation::Cloud,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransferJob::Upload(_) => "upload",
            TransferJob::Download(_) => "download",
        }
    }
}

/// Why a transfer did not complete
#[derive(Debug, Error)]
pub enum TransferError {
    /// The local file could not be stat'ed or read
    #[error("cannot read local file {name}: {source}")]
    LocalRead {
        name: Filename,
        #[source]
        source: std::io::Error,
    },

    /// The downloaded content could not be written
    #[error("cannot write local file {name}: {source}")]
    LocalWrite {
        name: Filename,
        #[source]
        source: std::io::Error,
    },

    /// The store refused the transfer, possibly after retries
    #[error("store error for {name}: {source}")]
    Store {
        name: Filename,
        #[source]
        source: StoreError,
    },
}

// ============================================================================
// TransferExecutor
// ============================================================================

/// Executes single transfers against one bucket and one working directory
pub struct TransferExecutor {
    store: Arc<dyn IObjectStore>,
    bucket: BucketName,
    dir: PathBuf,
    retry: RetryPolicy,
    status: StatusPublisher,
}

impl TransferExecutor {
    pub fn new(
        store: Arc<dyn IObjectStore>,
        bucket: BucketName,
        dir: impl Into<PathBuf>,
        retry: RetryPolicy,
        status: StatusPublisher,
    ) -> Self {
        Self {
            store,
            bucket,
            dir: dir.into(),
            retry,
            status,
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.dir
    }

    /// Runs `job`, returning the terminal `Synced` record on success
    pub async fn execute(&self, job: &TransferJob) -> Result<SyncInfo, TransferError> {
        match job {
            TransferJob::Upload(name) => self.upload(name).await,
            TransferJob::Download(name) => self.download(name).await,
        }
    }

    /// Pushes the local file `name` to the bucket
    #[instrument(skip(self, name), fields(filename = %name, bucket = %self.bucket))]
    pub async fn upload(&self, name: &Filename) -> Result<SyncInfo, TransferError> {
        let modified = modified_time(&self.dir, name).await.map_err(|source| {
            warn!(error = %source, "Cannot stat local file, skipping upload");
            TransferError::LocalRead {
                name: name.clone(),
                source,
            }
        })?;

        self.status
            .publish(SyncInfo::uploading(name.clone(), modified))
            .await;
        info!("Uploading to cloud");

        let result = async {
            let data = read_file(&self.dir, name)
                .await
                .map_err(|source| TransferError::LocalRead {
                    name: name.clone(),
                    source,
                })?;
            with_retry(&self.retry, "put", || {
                self.store.put(&self.bucket, name.as_str(), &data)
            })
            .await
            .map_err(|source| TransferError::Store {
                name: name.clone(),
                source,
            })?;
            debug!(size = data.len(), "Upload complete");
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                let synced = SyncInfo::uploaded(name.clone(), modified);
                self.status.publish(synced.clone()).await;
                Ok(synced)
            }
            Err(e) => {
                self.report_failure(name, FileLocation::Local, modified, &e)
                    .await;
                Err(e)
            }
        }
    }

    /// Pulls the object `name` into the working directory
    #[instrument(skip(self, name), fields(filename = %name, bucket = %self.bucket))]
    pub async fn download(&self, name: &Filename) -> Result<SyncInfo, TransferError> {
        let started_at = Utc::now();
        self.status
            .publish(SyncInfo::downloading(name.clone(), started_at))
            .await;
        info!("Downloading from cloud");

        let result = async {
            let object = with_retry(&self.retry, "get", || {
                self.store.get(&self.bucket, name.as_str())
            })
            .await
            .map_err(|source| TransferError::Store {
                name: name.clone(),
                source,
            })?;
            write_atomic(&self.dir, name, &object.data)
                .await
                .map_err(|source| TransferError::LocalWrite {
                    name: name.clone(),
                    source,
                })?;
            debug!(size = object.data.len(), "Download complete");
            Ok(object.last_modified)
        }
        .await;

        match result {
            Ok(remote_modified) => {
                let synced = SyncInfo::downloaded(name.clone(), remote_modified);
                self.status.publish(synced.clone()).await;
                Ok(synced)
            }
            Err(e) => {
                self.report_failure(name, FileLocation::Cloud, started_at, &e)
                    .await;
                Err(e)
            }
        }
    }

    /// True if the local file's modification time is no longer `since`
    ///
    /// A file that cannot be stat'ed counts as unchanged; a later event
    /// will bring it back.
    pub async fn local_changed_since(&self, name: &Filename, since: DateTime<Utc>) -> bool {
        match modified_time(&self.dir, name).await {
            Ok(modified) => modified != since,
            Err(_) => false,
        }
    }

    async fn report_failure(
        &self,
        name: &Filename,
        source: FileLocation,
        last_modified: DateTime<Utc>,
        err: &TransferError,
    ) {
        error!(error = %err, "Transfer failed");
        self.status
            .publish(SyncInfo::failed(
                name.clone(),
                source,
                last_modified,
                err.to_string(),
            ))
            .await;
    }
}

impl std::fmt::Debug for TransferExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferExecutor")
            .field("provider", &self.store.provider_name())
            .field("bucket", &self.bucket)
            .field("dir", &self.dir)
            .field("retry", &self.retry)
            .finish()
    }
}
