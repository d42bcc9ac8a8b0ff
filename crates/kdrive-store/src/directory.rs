//! DirectoryObjectStore - a bucket per subdirectory of a local root
//!
//! `<root>/<bucket>/<key>` holds one object. The object's last-modified
//! time is the file's mtime. Writes go to a hidden temporary file in the
//! bucket directory and are renamed into place, so a concurrent reader
//! sees either the old object or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use kdrive_core::domain::BucketName;
use kdrive_core::ports::{IObjectStore, RemoteObject, StoreError};

/// Suffix of in-progress writes; such files are never listed
const TEMP_SUFFIX: &str = ".kdrive-store-tmp";

/// Object store over a local directory tree
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    /// Creates a store rooted at `root`; buckets are its subdirectories
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory holding the buckets
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &BucketName) -> PathBuf {
        self.root.join(bucket.as_str())
    }

    fn object_path(&self, bucket: &BucketName, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".."
        {
            return Err(StoreError::Other(format!("unsupported key: {key:?}")));
        }
        Ok(self.bucket_dir(bucket).join(key))
    }

    async fn ensure_bucket(&self, bucket: &BucketName) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir(bucket);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StoreError::BucketNotFound(bucket.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_temp_artifact(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

#[async_trait::async_trait]
impl IObjectStore for DirectoryObjectStore {
    fn provider_name(&self) -> &'static str {
        "directory"
    }

    async fn list(&self, bucket: &BucketName) -> Result<Vec<String>, StoreError> {
        let dir = self.ensure_bucket(bucket).await?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_temp_artifact(&name) {
                continue;
            }
            keys.push(name);
        }

        Ok(keys)
    }

    async fn get(&self, bucket: &BucketName, key: &str) -> Result<RemoteObject, StoreError> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let modified = tokio::fs::metadata(&path).await?.modified()?;

        Ok(RemoteObject {
            data,
            last_modified: DateTime::<Utc>::from(modified),
        })
    }

    async fn put(&self, bucket: &BucketName, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let dir = self.ensure_bucket(bucket).await?;
        let target = self.object_path(bucket, key)?;
        let temp = dir.join(format!(".{key}{TEMP_SUFFIX}"));

        if let Err(e) = tokio::fs::write(&temp, data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(bucket = %bucket, key, size = data.len(), "Stored object");
        Ok(())
    }
}
