//! spsync Sync - local scanning and the upload orchestrator
//!
//! Provides:
//! - Deterministic, filtered inventories of a mapping's source tree
//! - Ledger-driven change detection (content digests)
//! - Per-mapping sync jobs with retry, bounded upload fan-out and cancellation
//!
//! ## Modules
//!
//! - [`scanner`] - Recursive walk, glob/size filters and SHA-256 digests
//! - [`engine`] - The [`engine::SyncEngine`] orchestrating scan, ledger and remote

pub mod engine;
pub mod scanner;

use std::path::PathBuf;

use thiserror::Error;

use spsync_core::domain::{MappingId, TenantId};
use spsync_core::ports::{RemoteError, StorageError};

/// Errors that stop a scan before it produces an inventory
#[derive(Debug, Error)]
pub enum ScanError {
    /// The source directory is missing or not a directory
    #[error("Source path is not a readable directory: {0}")]
    Path(PathBuf),

    /// An include or exclude pattern does not compile
    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Ledger error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tenant not found: {0}")]
    TenantNotFound(TenantId),

    #[error("Mapping not found: {tenant}/{mapping}")]
    MappingNotFound { tenant: TenantId, mapping: MappingId },
}
