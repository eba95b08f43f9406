//! Domain error types
//!
//! Validation failures raised when constructing domain values from
//! configuration, storage rows or remote responses.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid local path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid content digest (expected lower-case hex SHA-256)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid tenant or mapping identifier
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Unknown status string for a file or job
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
