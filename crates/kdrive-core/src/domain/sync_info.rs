//! Sync status records
//!
//! A [`SyncInfo`] is one observation of a file's transfer state at a point
//! in time. The engine emits them onto the status channel; nothing stores
//! them. The constructors below are the only place the `location`
//! convention is encoded:
//!
//! | Transfer | In progress          | Completed       | Failed         |
//! |----------|----------------------|-----------------|----------------|
//! | Upload   | `Local` / Uploading  | `Cloud` / Synced | `Local` / Failed |
//! | Download | `Cloud` / Downloading | `Local` / Synced | `Cloud` / Failed |
//!
//! In-progress and failed records name the source side (where the only
//! current copy lives); a synced record names the side that just became
//! current.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::Filename;

/// Which side of the sync a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileLocation {
    /// The remote bucket
    Cloud,
    /// The local working directory
    Local,
}

impl Display for FileLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FileLocation::Cloud => write!(f, "Cloud"),
            FileLocation::Local => write!(f, "Local"),
        }
    }
}

/// Transfer phase of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// The transfer completed; both sides hold the content
    Synced,
    /// Local content is being pushed to the bucket
    Uploading,
    /// Remote content is being pulled into the working directory
    Downloading,
    /// The transfer was abandoned after exhausting its attempts
    Failed,
}

impl SyncStatus {
    /// Returns true for the transient transfer phases
    pub fn is_in_progress(&self) -> bool {
        matches!(self, SyncStatus::Uploading | SyncStatus::Downloading)
    }

    /// Returns true for statuses that end a transfer
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Synced | SyncStatus::Failed)
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "Synced"),
            SyncStatus::Uploading => write!(f, "Uploading"),
            SyncStatus::Downloading => write!(f, "Downloading"),
            SyncStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One observation of a file's sync state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    /// Name of the file in the flat namespace
    pub filename: Filename,
    /// Local mtime or remote last-modified time, depending on the record
    pub last_modified: DateTime<Utc>,
    /// Side this record describes
    pub location: FileLocation,
    /// Transfer phase
    pub status: SyncStatus,
    /// Failure description, only present on `Failed` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncInfo {
    /// An upload has started for a local file with the given mtime
    pub fn uploading(filename: Filename, local_modified: DateTime<Utc>) -> Self {
        Self {
            filename,
            last_modified: local_modified,
            location: FileLocation::Local,
            status: SyncStatus::Uploading,
            error: None,
        }
    }

    /// An upload finished; the bucket now holds the local content
    pub fn uploaded(filename: Filename, local_modified: DateTime<Utc>) -> Self {
        Self {
            filename,
            last_modified: local_modified,
            location: FileLocation::Cloud,
            status: SyncStatus::Synced,
            error: None,
        }
    }

    /// A download has started at `started_at`
    pub fn downloading(filename: Filename, started_at: DateTime<Utc>) -> Self {
        Self {
            filename,
            last_modified: started_at,
            location: FileLocation::Cloud,
            status: SyncStatus::Downloading,
            error: None,
        }
    }

    /// A download finished; the working directory now holds the remote content
    pub fn downloaded(filename: Filename, remote_modified: DateTime<Utc>) -> Self {
        Self {
            filename,
            last_modified: remote_modified,
            location: FileLocation::Local,
            status: SyncStatus::Synced,
            error: None,
        }
    }

    /// A transfer out of `source` was abandoned
    pub fn failed(
        filename: Filename,
        source: FileLocation,
        last_modified: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            filename,
            last_modified,
            location: source,
            status: SyncStatus::Failed,
            error: Some(error.into()),
        }
    }
}
