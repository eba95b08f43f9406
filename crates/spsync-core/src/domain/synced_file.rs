//! SyncedFile ledger record
//!
//! One record per (tenant, mapping, local path). The record carries the
//! content digest of the last successful or attempted transfer, which is what
//! change detection compares against.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentHash, MappingId, TenantId};

/// Per-file sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Known to the ledger but not yet attempted
    Pending,
    /// Transfer in progress
    Syncing,
    /// Last transfer succeeded
    Synced,
    /// Last transfer failed, retried on the next run
    Failed,
    /// Removed locally
    Deleted,
}

impl FileStatus {
    /// Storage representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Syncing => "syncing",
            FileStatus::Synced => "synced",
            FileStatus::Failed => "failed",
            FileStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "syncing" => Ok(FileStatus::Syncing),
            "synced" => Ok(FileStatus::Synced),
            "failed" => Ok(FileStatus::Failed),
            "deleted" => Ok(FileStatus::Deleted),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// Durable record of a file's sync state
///
/// `local_path` is the `/`-separated path relative to the mapping's source
/// directory. `remote_path` and `remote_id` are empty for failed records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedFile {
    pub tenant_id: TenantId,
    pub mapping_id: MappingId,
    pub local_path: String,
    pub remote_path: String,
    pub remote_id: String,
    pub content_hash: ContentHash,
    pub size: u64,
    pub local_modified: DateTime<Utc>,
    pub remote_modified: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
    pub status: FileStatus,
    pub error_message: Option<String>,
}

impl SyncedFile {
    /// Returns true when the stored digest is current for `hash`
    ///
    /// Only a `synced` record with a matching digest is up to date; every
    /// other status is retried.
    pub fn is_current(&self, hash: &ContentHash) -> bool {
        self.status == FileStatus::Synced && &self.content_hash == hash
    }
}
