//! Domain error types
//!
//! Validation failures raised while constructing domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A filename that cannot live in the flat sync namespace
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// An empty or malformed bucket name
    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
