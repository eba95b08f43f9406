//! SQLite implementation of ISyncLedger
//!
//! ## Type Mapping
//!
//! | Domain Type           | SQL Type | Strategy                                   |
//! |-----------------------|----------|--------------------------------------------|
//! | TenantId, MappingId   | TEXT     | `.as_str()` / `::new()`                    |
//! | JobId                 | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | ContentHash           | TEXT     | lower-case hex via `.as_str()` / `::new()` |
//! | FileStatus, JobStatus | TEXT     | `.as_str()` / `FromStr`                    |
//! | DateTime<Utc>         | TEXT     | RFC 3339, UTC, microseconds                |
//! | u64 counters, sizes   | INTEGER  | cast through `i64`                         |
//! | SyncError[]           | TEXT     | serde_json array                           |

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use spsync_core::domain::{
    ContentHash, FileStatus, JobCounters, JobId, JobStatus, MappingId, SyncError, SyncJob,
    SyncedFile, TenantId,
};
use spsync_core::ports::{ISyncLedger, LedgerStats, StorageError};

use crate::CacheError;

/// SQLite-backed sync ledger
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SqliteSyncLedger {
    pool: SqlitePool,
}

impl SqliteSyncLedger {
    /// Creates a new ledger over the given (already migrated) pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Distinguishes a missing job from a terminal one after an UPDATE
    /// guarded by `status` matched no rows
    async fn explain_untouched_job(&self, id: JobId) -> StorageError {
        let status: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM sync_jobs WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await;
        match status {
            Ok(Some(_)) => StorageError::JobFinished(id),
            Ok(None) => StorageError::JobNotFound(id),
            Err(e) => CacheError::from(e).into(),
        }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Formats a timestamp so that text order matches chronological order
fn fmt_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("bad timestamp '{s}': {e}")))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn serialization(e: impl std::fmt::Display) -> CacheError {
    CacheError::SerializationError(e.to_string())
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn synced_file_from_row(row: &SqliteRow) -> Result<SyncedFile, CacheError> {
    let tenant: String = row.try_get("tenant_id")?;
    let mapping: String = row.try_get("mapping_id")?;
    let hash: String = row.try_get("content_hash")?;
    let status: String = row.try_get("status")?;
    let local_modified: String = row.try_get("local_modified")?;
    let synced_at: String = row.try_get("synced_at")?;

    Ok(SyncedFile {
        tenant_id: TenantId::new(tenant).map_err(serialization)?,
        mapping_id: MappingId::new(mapping).map_err(serialization)?,
        local_path: row.try_get("local_path")?,
        remote_path: row.try_get("remote_path")?,
        remote_id: row.try_get("remote_id")?,
        content_hash: ContentHash::new(hash).map_err(serialization)?,
        size: to_u64(row.try_get("size_bytes")?),
        local_modified: parse_datetime(&local_modified)?,
        remote_modified: parse_optional_datetime(row.try_get("remote_modified")?)?,
        synced_at: parse_datetime(&synced_at)?,
        status: status.parse().map_err(serialization)?,
        error_message: row.try_get("error_message")?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<SyncJob, CacheError> {
    let id: String = row.try_get("id")?;
    let tenant: String = row.try_get("tenant_id")?;
    let mapping: Option<String> = row.try_get("mapping_id")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let errors: String = row.try_get("errors")?;

    let counters = JobCounters {
        files_total: to_u64(row.try_get("files_total")?),
        files_processed: to_u64(row.try_get("files_processed")?),
        files_failed: to_u64(row.try_get("files_failed")?),
        bytes_total: to_u64(row.try_get("bytes_total")?),
        bytes_transferred: to_u64(row.try_get("bytes_transferred")?),
    };
    let errors: Vec<SyncError> = serde_json::from_str(&errors)
        .map_err(|e| CacheError::SerializationError(format!("job {id} errors: {e}")))?;

    Ok(SyncJob::from_parts(
        id.parse().map_err(serialization)?,
        TenantId::new(tenant).map_err(serialization)?,
        mapping
            .map(MappingId::new)
            .transpose()
            .map_err(serialization)?,
        status.parse().map_err(serialization)?,
        parse_datetime(&started_at)?,
        parse_optional_datetime(row.try_get("completed_at")?)?,
        counters,
        errors,
    ))
}

fn rows_to<T>(
    rows: &[SqliteRow],
    f: fn(&SqliteRow) -> Result<T, CacheError>,
) -> Result<Vec<T>, StorageError> {
    rows.iter()
        .map(|row| f(row).map_err(StorageError::from))
        .collect()
}

// ============================================================================
// ISyncLedger implementation
// ============================================================================

#[async_trait::async_trait]
impl ISyncLedger for SqliteSyncLedger {
    // --- File records ---

    async fn needs_sync(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
        current_hash: &ContentHash,
    ) -> Result<bool, StorageError> {
        let record = self.get_synced_file(tenant, mapping, local_path).await?;
        Ok(record.map_or(true, |r| !r.is_current(current_hash)))
    }

    async fn upsert_synced_file(&self, record: &SyncedFile) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO synced_files \
             (tenant_id, mapping_id, local_path, remote_path, remote_id, content_hash, \
              size_bytes, local_modified, remote_modified, synced_at, status, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (tenant_id, mapping_id, local_path) DO UPDATE SET \
              remote_path = excluded.remote_path, \
              remote_id = excluded.remote_id, \
              content_hash = excluded.content_hash, \
              size_bytes = excluded.size_bytes, \
              local_modified = excluded.local_modified, \
              remote_modified = excluded.remote_modified, \
              synced_at = excluded.synced_at, \
              status = excluded.status, \
              error_message = excluded.error_message",
        )
        .bind(record.tenant_id.as_str())
        .bind(record.mapping_id.as_str())
        .bind(&record.local_path)
        .bind(&record.remote_path)
        .bind(&record.remote_id)
        .bind(record.content_hash.as_str())
        .bind(to_i64(record.size))
        .bind(fmt_datetime(&record.local_modified))
        .bind(record.remote_modified.as_ref().map(fmt_datetime))
        .bind(fmt_datetime(&record.synced_at))
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        tracing::trace!(
            tenant = %record.tenant_id,
            mapping = %record.mapping_id,
            path = %record.local_path,
            status = %record.status,
            "Upserted synced file"
        );
        Ok(())
    }

    async fn get_synced_file(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
    ) -> Result<Option<SyncedFile>, StorageError> {
        let row = sqlx::query(
            "SELECT * FROM synced_files \
             WHERE tenant_id = ? AND mapping_id = ? AND local_path = ?",
        )
        .bind(tenant.as_str())
        .bind(mapping.as_str())
        .bind(local_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(CacheError::from)?;

        match row {
            Some(ref r) => Ok(Some(synced_file_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn update_file_status(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
        status: FileStatus,
        error: Option<&str>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE synced_files SET status = ?, error_message = ? \
             WHERE tenant_id = ? AND mapping_id = ? AND local_path = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(tenant.as_str())
        .bind(mapping.as_str())
        .bind(local_path)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_synced_file(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "DELETE FROM synced_files \
             WHERE tenant_id = ? AND mapping_id = ? AND local_path = ?",
        )
        .bind(tenant.as_str())
        .bind(mapping.as_str())
        .bind(local_path)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_stats(&self, tenant: &TenantId) -> Result<LedgerStats, StorageError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count, COALESCE(SUM(size_bytes), 0) AS bytes \
             FROM synced_files WHERE tenant_id = ? GROUP BY status",
        )
        .bind(tenant.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        let mut stats = LedgerStats::default();
        for row in &rows {
            let status: String = row.try_get("status").map_err(CacheError::from)?;
            let count = to_u64(row.try_get("count").map_err(CacheError::from)?);
            let bytes = to_u64(row.try_get("bytes").map_err(CacheError::from)?);

            stats.total_files += count;
            match status.parse::<FileStatus>().map_err(serialization)? {
                FileStatus::Pending => stats.pending = count,
                FileStatus::Syncing => stats.syncing = count,
                FileStatus::Synced => {
                    stats.synced = count;
                    stats.synced_bytes = bytes;
                }
                FileStatus::Failed => stats.failed = count,
                FileStatus::Deleted => stats.deleted = count,
            }
        }

        let last_sync: Option<String> = sqlx::query_scalar(
            "SELECT MAX(synced_at) FROM synced_files WHERE tenant_id = ? AND status = 'synced'",
        )
        .bind(tenant.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(CacheError::from)?;
        stats.last_sync = parse_optional_datetime(last_sync)?;

        Ok(stats)
    }

    async fn get_synced_files_for_mapping(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
    ) -> Result<Vec<SyncedFile>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM synced_files WHERE tenant_id = ? AND mapping_id = ? \
             ORDER BY local_path",
        )
        .bind(tenant.as_str())
        .bind(mapping.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows_to(&rows, synced_file_from_row)
    }

    async fn get_failed_files(
        &self,
        tenant: &TenantId,
        mapping: Option<&MappingId>,
    ) -> Result<Vec<SyncedFile>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM synced_files \
             WHERE tenant_id = ?1 AND status = 'failed' AND (?2 IS NULL OR mapping_id = ?2) \
             ORDER BY mapping_id, local_path",
        )
        .bind(tenant.as_str())
        .bind(mapping.map(MappingId::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows_to(&rows, synced_file_from_row)
    }

    async fn clear_history(
        &self,
        tenant: &TenantId,
        mapping: Option<&MappingId>,
    ) -> Result<u64, StorageError> {
        let mapping = mapping.map(MappingId::as_str);
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;

        let files = sqlx::query(
            "DELETE FROM synced_files WHERE tenant_id = ?1 AND (?2 IS NULL OR mapping_id = ?2)",
        )
        .bind(tenant.as_str())
        .bind(mapping)
        .execute(&mut *tx)
        .await
        .map_err(CacheError::from)?;

        let jobs = sqlx::query(
            "DELETE FROM sync_jobs WHERE tenant_id = ?1 AND (?2 IS NULL OR mapping_id = ?2)",
        )
        .bind(tenant.as_str())
        .bind(mapping)
        .execute(&mut *tx)
        .await
        .map_err(CacheError::from)?;

        tx.commit().await.map_err(CacheError::from)?;

        let removed = files.rows_affected() + jobs.rows_affected();
        tracing::info!(
            tenant = %tenant,
            mapping = mapping.unwrap_or("*"),
            files = files.rows_affected(),
            jobs = jobs.rows_affected(),
            "Cleared sync history"
        );
        Ok(removed)
    }

    // --- Jobs ---

    async fn create_job(
        &self,
        tenant: &TenantId,
        mapping: Option<&MappingId>,
    ) -> Result<SyncJob, StorageError> {
        let job = SyncJob::new(tenant.clone(), mapping.cloned());

        sqlx::query(
            "INSERT INTO sync_jobs (id, tenant_id, mapping_id, status, started_at, errors) \
             VALUES (?, ?, ?, ?, ?, '[]')",
        )
        .bind(job.id().to_string())
        .bind(tenant.as_str())
        .bind(mapping.map(MappingId::as_str))
        .bind(job.status().as_str())
        .bind(fmt_datetime(&job.started_at()))
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        tracing::debug!(job_id = %job.id(), tenant = %tenant, "Created sync job");
        Ok(job)
    }

    async fn set_job_totals(
        &self,
        id: JobId,
        files_total: u64,
        bytes_total: u64,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET files_total = ?, bytes_total = ?, status = 'running' \
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(to_i64(files_total))
        .bind(to_i64(bytes_total))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_untouched_job(id).await);
        }
        Ok(())
    }

    async fn update_job_progress(
        &self,
        id: JobId,
        processed_delta: u64,
        bytes_delta: u64,
        failed_delta: u64,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET \
              files_processed = files_processed + ?, \
              bytes_transferred = bytes_transferred + ?, \
              files_failed = files_failed + ? \
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(to_i64(processed_delta))
        .bind(to_i64(bytes_delta))
        .bind(to_i64(failed_delta))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_untouched_job(id).await);
        }
        Ok(())
    }

    async fn complete_job(
        &self,
        id: JobId,
        status: JobStatus,
        errors: &[SyncError],
    ) -> Result<(), StorageError> {
        if !status.is_terminal() {
            return Err(StorageError::InvalidTransition(format!(
                "job {id} cannot complete with status '{status}'"
            )));
        }
        let errors_json = serde_json::to_string(errors).map_err(serialization)?;

        let result = sqlx::query(
            "UPDATE sync_jobs SET status = ?, completed_at = ?, errors = ? \
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(status.as_str())
        .bind(fmt_datetime(&Utc::now()))
        .bind(&errors_json)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_untouched_job(id).await);
        }

        tracing::debug!(job_id = %id, status = %status, errors = errors.len(), "Completed sync job");
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<SyncJob>, StorageError> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;

        match row {
            Some(ref r) => Ok(Some(job_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_recent_jobs(
        &self,
        tenant: Option<&TenantId>,
        limit: u32,
    ) -> Result<Vec<SyncJob>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM sync_jobs WHERE (?1 IS NULL OR tenant_id = ?1) \
             ORDER BY started_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(tenant.map(TenantId::as_str))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows_to(&rows, job_from_row)
    }
}
