//! Domain newtypes with validation
//!
//! Each newtype checks its invariants at construction time so the engine
//! never has to re-validate a name it already holds.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Filename
// ============================================================================

/// A file name in the flat sync namespace
///
/// The same value names a regular file directly inside the working
/// directory and an object key in the bucket. Subdirectories are not
/// supported, so separators and the special `.`/`..` entries are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filename(String);

impl Filename {
    /// Create a new Filename
    ///
    /// # Errors
    /// Returns error if the name is empty, contains a path separator or NUL,
    /// or is one of the special directory entries
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();

        if name.is_empty() {
            return Err(DomainError::InvalidFilename(
                "Filename cannot be empty".to_string(),
            ));
        }

        if name == "." || name == ".." {
            return Err(DomainError::InvalidFilename(format!(
                "Filename cannot be a directory reference: {name}"
            )));
        }

        if name.contains(['/', '\\', '\0']) {
            return Err(DomainError::InvalidFilename(format!(
                "Filename must not contain separators: {name}"
            )));
        }

        Ok(Self(name))
    }

    /// Extracts the final path segment of a watcher event path
    ///
    /// Returns `None` when the path has no final segment or that segment
    /// is not valid UTF-8 or not a valid flat filename.
    pub fn from_event_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::new(name).ok()
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Filename {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Filename {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Filename {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Filename> for String {
    fn from(name: Filename) -> Self {
        name.0
    }
}

impl AsRef<str> for Filename {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// BucketName
// ============================================================================

/// Identifier of the remote bucket the working directory mirrors
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new BucketName
    ///
    /// # Errors
    /// Returns error if the name is empty or only whitespace
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(DomainError::InvalidBucketName(
                "Bucket name cannot be empty".to_string(),
            ));
        }

        if name.contains('/') {
            return Err(DomainError::InvalidBucketName(format!(
                "Bucket name must not contain '/': {name}"
            )));
        }

        Ok(Self(name))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BucketName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BucketName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BucketName> for String {
    fn from(name: BucketName) -> Self {
        name.0
    }
}
