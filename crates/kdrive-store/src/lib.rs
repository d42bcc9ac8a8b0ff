//! KDrive Store - object-store adapters
//!
//! Implementations of the [`IObjectStore`] port:
//!
//! - [`s3`] - Amazon S3 and S3-compatible services via `aws-sdk-s3`
//! - [`directory`] - a local directory whose subdirectories act as buckets
//! - [`memory`] - an in-process bucket with call counters and failure
//!   injection, used by the engine's tests
//!
//! [`build_store`] selects an adapter from the `storage` configuration
//! section.

pub mod directory;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use kdrive_core::config::{ConfigError, StorageConfig, StorageProvider};
use kdrive_core::ports::IObjectStore;

pub use directory::DirectoryObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Builds the adapter named by `config.provider`
pub async fn build_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn IObjectStore>> {
    match config.provider {
        StorageProvider::S3 => {
            let store = S3ObjectStore::from_config(config).await;
            tracing::debug!(
                region = ?config.region,
                endpoint = ?config.endpoint_url,
                "Using S3 object store"
            );
            Ok(Arc::new(store))
        }
        StorageProvider::Directory => {
            let root = config.root.as_ref().ok_or(ConfigError::MissingStorageRoot)?;
            tracing::debug!(root = %root.display(), "Using directory object store");
            Ok(Arc::new(DirectoryObjectStore::new(root)))
        }
    }
}
