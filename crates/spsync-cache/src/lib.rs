//! spsync Cache - Durable sync ledger
//!
//! SQLite-based storage for:
//! - Per-file sync records keyed by (tenant, mapping, local path)
//! - Per-run job records with counters and error lists
//!
//! ## Architecture
//!
//! This crate implements the `ISyncLedger` port from `spsync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteSyncLedger`] - `ISyncLedger` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use spsync_cache::{DatabasePool, SqliteSyncLedger};
//!
//! # async fn example() -> Result<(), spsync_cache::CacheError> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/spsync/ledger.db")).await?;
//! let ledger = SqliteSyncLedger::new(pool.pool().clone());
//! // Use ledger as ISyncLedger...
//! # Ok(())
//! # }
//! ```

pub mod ledger;
pub mod pool;

pub use ledger::SqliteSyncLedger;
pub use pool::DatabasePool;

use spsync_core::ports::StorageError;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<CacheError> for StorageError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::ConnectionFailed(msg) | CacheError::MigrationFailed(msg) => {
                StorageError::Connection(msg)
            }
            CacheError::QueryFailed(msg) => StorageError::Query(msg),
            CacheError::SerializationError(msg) => StorageError::Corrupt(msg),
        }
    }
}
