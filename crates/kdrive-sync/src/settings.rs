//! Validated engine settings
//!
//! [`SyncSettings`] is the only configuration value the engine reads. It is
//! derived once from a [`Config`] and refuses to exist if any field the
//! engine depends on is missing or unusable, so no listing or transfer can
//! happen against a half-configured engine.

use std::path::PathBuf;
use std::time::Duration;

use kdrive_core::config::{Config, ConfigError};
use kdrive_core::domain::BucketName;

use crate::transfer::RetryPolicy;

/// Engine settings with every invariant already checked
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Absolute path of an existing directory
    pub working_directory: PathBuf,
    /// Bucket mirrored by the working directory
    pub bucket: BucketName,
    /// Period of the cloud poller, at least one second
    pub poll_interval: Duration,
    /// Upper bound on concurrently running transfers
    pub max_concurrent_transfers: usize,
    /// Run one reconciliation pass before the loops start
    pub initial_reconcile: bool,
    /// How long shutdown waits for in-flight transfers
    pub shutdown_grace_period: Duration,
    /// Backoff applied to transient store failures
    pub retry: RetryPolicy,
    /// Capacity of the status channel the caller should create
    pub status_channel_capacity: usize,
    /// How long a status publish may wait before the event is dropped
    pub status_send_timeout: Duration,
}

impl SyncSettings {
    /// Derives settings from `config`, reporting the first unusable field
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let sync = &config.sync;
        sync.check_working_directory()?;

        if sync.bucket_name.trim().is_empty() {
            return Err(ConfigError::MissingBucketName);
        }
        let bucket = BucketName::new(sync.bucket_name.clone())
            .map_err(|e| ConfigError::InvalidBucketName(e.to_string()))?;

        if sync.poll_interval == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        if sync.max_concurrent_transfers == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }
        if config.status.channel_capacity == 0 {
            return Err(ConfigError::InvalidStatusCapacity);
        }

        Ok(Self {
            working_directory: sync.working_directory.clone(),
            bucket,
            poll_interval: Duration::from_secs(sync.poll_interval),
            max_concurrent_transfers: sync.max_concurrent_transfers as usize,
            initial_reconcile: sync.initial_reconcile,
            shutdown_grace_period: Duration::from_secs(sync.shutdown_grace_period),
            retry: RetryPolicy::from_config(&config.retry),
            status_channel_capacity: config.status.channel_capacity,
            status_send_timeout: Duration::from_millis(config.status.send_timeout_ms),
        })
    }
}
