//! Configuration module for KDrive.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//!
//! The engine never reads this module's types directly: it derives a
//! validated settings value at construction and refuses to start with a
//! [`ConfigError`] if a required field is missing or unusable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for KDrive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub status: StatusConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Absolute path of the local directory kept in sync.
    pub working_directory: PathBuf,
    /// Bucket mirrored by the working directory.
    pub bucket_name: String,
    /// Seconds between cloud polling ticks.
    pub poll_interval: u64,
    /// Maximum transfers running at once.
    pub max_concurrent_transfers: u32,
    /// Run one full reconciliation pass before entering the loops.
    pub initial_reconcile: bool,
    /// Seconds to wait for in-flight transfers on shutdown.
    pub shutdown_grace_period: u64,
}

/// Retry policy for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per store call (1 disables retry).
    pub max_attempts: u32,
    /// Backoff base in milliseconds; doubles after every attempt.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff wait in milliseconds.
    pub max_delay_ms: u64,
}

/// Status channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Capacity of the bounded status channel.
    pub channel_capacity: usize,
    /// How long a publish may wait for room before the event is dropped.
    pub send_timeout_ms: u64,
}

/// Remote store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Amazon S3 or an S3-compatible endpoint.
    S3,
    /// A local directory whose subdirectories act as buckets.
    Directory,
}

impl std::fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageProvider::S3 => write!(f, "s3"),
            StorageProvider::Directory => write!(f, "directory"),
        }
    }
}

/// Remote store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which adapter to build.
    pub provider: StorageProvider,
    /// Region override for S3; the default AWS chain is used when unset.
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Use path-style bucket addressing (needed by most S3-compatible services).
    pub force_path_style: bool,
    /// Root directory holding the buckets, for the `directory` provider.
    pub root: Option<PathBuf>,
    /// Upper bound in seconds on one S3 call, including connecting.
    pub operation_timeout: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/kdrive/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("kdrive")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

// The working directory and bucket have no usable default: they stay empty
// so validation rejects a config that never set them.
impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::new(),
            bucket_name: String::new(),
            poll_interval: 30,
            max_concurrent_transfers: 4,
            initial_reconcile: true,
            shutdown_grace_period: 10,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            send_timeout_ms: 1000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::S3,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            root: None,
            operation_timeout: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if let Err(err) = self.sync.check_working_directory() {
            errors.push(ValidationError {
                field: "sync.working_directory".into(),
                message: err.to_string(),
            });
        }
        if self.sync.bucket_name.trim().is_empty() {
            errors.push(ValidationError {
                field: "sync.bucket_name".into(),
                message: "must be set".into(),
            });
        }
        if self.sync.poll_interval == 0 {
            errors.push(ValidationError {
                field: "sync.poll_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.max_concurrent_transfers == 0 {
            errors.push(ValidationError {
                field: "sync.max_concurrent_transfers".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- retry ---
        if self.retry.max_attempts == 0 {
            errors.push(ValidationError {
                field: "retry.max_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }

        // --- status ---
        if self.status.channel_capacity == 0 {
            errors.push(ValidationError {
                field: "status.channel_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- storage ---
        if self.storage.provider == StorageProvider::Directory && self.storage.root.is_none() {
            errors.push(ValidationError {
                field: "storage.root".into(),
                message: "required when provider is 'directory'".into(),
            });
        }

        if self.storage.operation_timeout == 0 {
            errors.push(ValidationError {
                field: "storage.operation_timeout".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigError - startup refusal
// ---------------------------------------------------------------------------

/// A configuration problem that prevents the engine from starting.
///
/// Each unusable field has its own variant so callers can tell a missing
/// directory from a missing bucket without parsing messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sync.working_directory is not set")]
    MissingWorkingDirectory,

    #[error("sync.working_directory must be an absolute path: {0}")]
    RelativeWorkingDirectory(PathBuf),

    #[error("sync.working_directory does not exist: {0}")]
    WorkingDirectoryNotFound(PathBuf),

    #[error("sync.working_directory is not a directory: {0}")]
    WorkingDirectoryNotADirectory(PathBuf),

    #[error("sync.bucket_name is not set")]
    MissingBucketName,

    #[error("sync.bucket_name is invalid: {0}")]
    InvalidBucketName(String),

    #[error("sync.poll_interval must be at least 1 second")]
    InvalidPollInterval,

    #[error("sync.max_concurrent_transfers must be at least 1")]
    InvalidConcurrency,

    #[error("retry.max_attempts must be at least 1")]
    InvalidRetryAttempts,

    #[error("status.channel_capacity must be at least 1")]
    InvalidStatusCapacity,

    #[error("storage.root is required for the directory provider")]
    MissingStorageRoot,
}

impl SyncConfig {
    /// Checks that the working directory is set, absolute, and an existing directory.
    pub fn check_working_directory(&self) -> Result<(), ConfigError> {
        let dir = &self.working_directory;
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingWorkingDirectory);
        }
        if !dir.is_absolute() {
            return Err(ConfigError::RelativeWorkingDirectory(dir.clone()));
        }
        match std::fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ConfigError::WorkingDirectoryNotADirectory(dir.clone())),
            Err(_) => Err(ConfigError::WorkingDirectoryNotFound(dir.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use kdrive_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .working_directory(PathBuf::from("/home/user/kdrive"))
///     .bucket_name("k-drive123")
///     .poll_interval(60)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn working_directory(mut self, dir: PathBuf) -> Self {
        self.config.sync.working_directory = dir;
        self
    }

    pub fn bucket_name(mut self, bucket: impl Into<String>) -> Self {
        self.config.sync.bucket_name = bucket.into();
        self
    }

    pub fn poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    pub fn max_concurrent_transfers(mut self, n: u32) -> Self {
        self.config.sync.max_concurrent_transfers = n;
        self
    }

    pub fn initial_reconcile(mut self, enabled: bool) -> Self {
        self.config.sync.initial_reconcile = enabled;
        self
    }

    pub fn shutdown_grace_period(mut self, seconds: u64) -> Self {
        self.config.sync.shutdown_grace_period = seconds;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay_ms = ms;
        self
    }

    // --- status ---

    pub fn status_channel_capacity(mut self, n: usize) -> Self {
        self.config.status.channel_capacity = n;
        self
    }

    pub fn status_send_timeout_ms(mut self, ms: u64) -> Self {
        self.config.status.send_timeout_ms = ms;
        self
    }

    // --- storage ---

    pub fn storage_provider(mut self, provider: StorageProvider) -> Self {
        self.config.storage.provider = provider;
        self
    }

    pub fn storage_region(mut self, region: impl Into<String>) -> Self {
        self.config.storage.region = Some(region.into());
        self
    }

    pub fn storage_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.storage.endpoint_url = Some(url.into());
        self
    }

    pub fn storage_force_path_style(mut self, enabled: bool) -> Self {
        self.config.storage.force_path_style = enabled;
        self
    }

    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.root = Some(root);
        self
    }

    pub fn storage_operation_timeout(mut self, seconds: u64) -> Self {
        self.config.storage.operation_timeout = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
