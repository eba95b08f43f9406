//! Remote store port (driven/secondary port)
//!
//! This module defines the interface to a document library: resolving a site
//! and its library, materializing folders and uploading files.
//!
//! ## Design Notes
//!
//! - Errors are classified by [`RemoteError`] so the orchestrator can retry
//!   transient failures and record the rest against the file.
//! - `IRemoteConnector` hands out a tenant-bound store; adapters decide how
//!   to cache clients.
//! - Names passed to the store are raw local names. Adapters sanitize every
//!   segment before talking to the service.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConflictBehavior, RemotePath, Tenant};

use super::authenticator::AuthError;

/// Errors raised by remote store implementations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Site, library or item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Token acquisition failed or the token was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The upload was rejected
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The name already exists and the conflict policy forbids replacing it
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited after exhausting client-side retries
    #[error("Throttled, retry after {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    /// 5xx response
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Connection, timeout or I/O failure
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Returns true for failures worth retrying: throttling, server errors
    /// and network errors
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Throttled { .. } | RemoteError::Server { .. } | RemoteError::Network(_)
        )
    }
}

impl From<AuthError> for RemoteError {
    fn from(err: AuthError) -> Self {
        RemoteError::Auth(err.to_string())
    }
}

/// A resolved SharePoint site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub web_url: Option<String>,
}

/// A document library (drive) of a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    pub id: String,
    pub name: String,
    pub web_url: Option<String>,
}

/// A file or folder in a drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub web_url: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_folder: bool,
}

/// Content handed to [`IRemoteStore::upload_file`]
#[derive(Debug, Clone)]
pub enum UploadContent {
    /// In-memory bytes
    Bytes(Vec<u8>),
    /// A file read from disk chunk by chunk
    File { path: PathBuf, size: u64 },
}

impl UploadContent {
    /// Total number of bytes to upload
    pub fn len(&self) -> u64 {
        match self {
            UploadContent::Bytes(bytes) => bytes.len() as u64,
            UploadContent::File { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Byte-progress callback: `(bytes_sent, bytes_total)`
pub type UploadProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// Port trait for a tenant-bound document library client
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Resolves a site from its absolute URL
    async fn resolve_site(&self, site_url: &str) -> Result<Site, RemoteError>;

    /// Finds a library of the site by name, case-insensitively
    async fn resolve_library(&self, site_id: &str, name: &str) -> Result<Drive, RemoteError>;

    /// Makes sure every folder along `path` exists and returns the last one
    ///
    /// The root path resolves to the drive root without any writes.
    async fn ensure_folder(&self, drive_id: &str, path: &RemotePath)
        -> Result<RemoteItem, RemoteError>;

    /// Uploads `content` as `name` under `parent`
    async fn upload_file(
        &self,
        drive_id: &str,
        parent: &RemotePath,
        name: &str,
        content: UploadContent,
        conflict: ConflictBehavior,
        on_progress: Option<&UploadProgressFn<'_>>,
    ) -> Result<RemoteItem, RemoteError>;
}

/// Port trait producing tenant-bound remote stores
#[async_trait::async_trait]
pub trait IRemoteConnector: Send + Sync {
    async fn connect(&self, tenant: &Tenant) -> Result<Arc<dyn IRemoteStore>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Throttled { retry_after_secs: 5 }.is_transient());
        assert!(RemoteError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(RemoteError::Network("reset".into()).is_transient());

        assert!(!RemoteError::NotFound("site".into()).is_transient());
        assert!(!RemoteError::Auth("bad secret".into()).is_transient());
        assert!(!RemoteError::Conflict("exists".into()).is_transient());
        assert!(!RemoteError::Upload("rejected".into()).is_transient());
    }

    #[test]
    fn test_upload_content_len() {
        assert_eq!(UploadContent::Bytes(vec![0; 12]).len(), 12);
        let file = UploadContent::File {
            path: PathBuf::from("/tmp/x"),
            size: 42,
        };
        assert_eq!(file.len(), 42);
        assert!(UploadContent::Bytes(Vec::new()).is_empty());
    }

    #[test]
    fn test_auth_error_maps_to_remote_auth() {
        let err: RemoteError = AuthError::MissingSecret("SPSYNC_SECRET".into()).into();
        assert!(matches!(err, RemoteError::Auth(_)));
    }
}
