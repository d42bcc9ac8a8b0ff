//! Object store port (driven/secondary port)
//!
//! The remote side of the sync is any store that can list keys in a
//! bucket, fetch one object in full, and write one object in full. No
//! multipart or streaming contract is required.
//!
//! ## Design Notes
//!
//! - Errors are typed ([`StoreError`]) so the transfer executor can tell a
//!   transient outage (retry) from a permanent refusal (give up).
//! - Uses `#[async_trait]` for async trait methods.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::newtypes::BucketName;

// ============================================================================
// RemoteObject
// ============================================================================

/// Full content and metadata of one fetched object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object content
    pub data: Vec<u8>,
    /// Last-modified time reported by the store
    pub last_modified: DateTime<Utc>,
}

// ============================================================================
// StoreError
// ============================================================================

/// Errors reported by an object store adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested key does not exist in the bucket
    #[error("Object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket that was queried
        bucket: String,
        /// Missing key
        key: String,
    },

    /// The bucket itself does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Credentials were missing, expired or insufficient
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The store could not be reached or asked us to back off
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Local I/O failure inside an adapter
    #[error("IO error: {0}")]
    Io(String),

    /// Any other adapter failure
    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Returns true for failures that may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

// ============================================================================
// IObjectStore trait
// ============================================================================

/// Port trait for remote object storage
///
/// Keys are the flat filenames of the working directory. Implementations
/// return every key in the bucket from [`list`](IObjectStore::list),
/// paging internally if the backend requires it.
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// Short adapter name used in log fields (e.g. `"s3"`)
    fn provider_name(&self) -> &'static str;

    /// Lists every key in the bucket
    async fn list(&self, bucket: &BucketName) -> Result<Vec<String>, StoreError>;

    /// Fetches one object in full
    async fn get(&self, bucket: &BucketName, key: &str) -> Result<RemoteObject, StoreError>;

    /// Writes one object in full, replacing any previous content
    async fn put(&self, bucket: &BucketName, key: &str, data: &[u8]) -> Result<(), StoreError>;
}
