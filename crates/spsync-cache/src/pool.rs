//! Database connection pool management
//!
//! Wraps SQLx's `SqlitePool` for the ledger. File databases use WAL so that
//! concurrent mapping runs can read while one writes, and a busy timeout so
//! writers queue instead of failing. The schema migration is idempotent and
//! runs on every open.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::CacheError;

const MIGRATION: &str = include_str!("migrations/20261017_initial.sql");

/// Pool tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// A migrated pool of SQLite connections holding the sync ledger
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the ledger at `db_path` with default settings
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the directory or database
    /// cannot be created, or `CacheError::MigrationFailed` if the schema
    /// cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        Self::with_settings(db_path, PoolSettings::default()).await
    }

    /// Opens the ledger at `db_path` with explicit pool settings
    pub async fn with_settings(db_path: &Path, settings: PoolSettings) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "cannot create ledger directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(settings.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "cannot open ledger at {}: {e}",
                    db_path.display()
                ))
            })?;

        migrate(&pool).await?;
        tracing::info!(path = %db_path.display(), "Ledger opened");

        Ok(Self { pool })
    }

    /// Creates a private in-memory ledger for tests
    ///
    /// Limited to one connection: every SQLite in-memory connection is its
    /// own database.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory ledger: {e}")))?;

        migrate(&pool).await?;
        tracing::debug!("In-memory ledger opened");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes all connections, waiting for in-flight queries
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
    sqlx::raw_sql(MIGRATION)
        .execute(pool)
        .await
        .map_err(|e| CacheError::MigrationFailed(e.to_string()))?;
    tracing::debug!("Ledger schema up to date");
    Ok(())
}
