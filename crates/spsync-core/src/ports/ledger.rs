//! Sync ledger port (driven/secondary port)
//!
//! This module defines the durable store of per-file sync records and
//! per-run job records.
//!
//! ## Design Notes
//!
//! - Errors are typed as [`StorageError`] so the orchestrator can tell a
//!   broken ledger apart from remote failures. The ledger never retries.
//! - `upsert_synced_file` is the single write path for transfer outcomes;
//!   records are keyed by (tenant, mapping, local path).
//! - Job progress updates are increments so that concurrent writers cannot
//!   lose counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    ContentHash, FileStatus, JobId, JobStatus, MappingId, SyncError, SyncJob, SyncedFile,
    TenantId,
};

/// Errors raised by ledger implementations
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying store could not be opened or reached
    #[error("Ledger connection failed: {0}")]
    Connection(String),

    /// A statement failed
    #[error("Ledger query failed: {0}")]
    Query(String),

    /// A stored row could not be turned back into a domain value
    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),

    /// No job with this id
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Attempted to mutate a job that already reached a terminal status
    #[error("Job {0} is already finished")]
    JobFinished(JobId),

    /// A job was asked to move to a status it cannot take
    #[error("Invalid job transition: {0}")]
    InvalidTransition(String),
}

/// Aggregate ledger statistics for a tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_files: u64,
    pub synced: u64,
    pub failed: u64,
    pub pending: u64,
    pub syncing: u64,
    pub deleted: u64,
    /// Sum of sizes of records with status `synced`
    pub synced_bytes: u64,
    /// Most recent `synced_at` across all records
    pub last_sync: Option<DateTime<Utc>>,
}

/// Port trait for the sync ledger
#[async_trait::async_trait]
pub trait ISyncLedger: Send + Sync {
    // --- File records ---

    /// Returns true if the file must be transferred
    ///
    /// A file needs sync when there is no record, when the stored digest
    /// differs from `current_hash`, or when the stored status is anything
    /// other than `synced` (a failed record is always retried).
    async fn needs_sync(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
        current_hash: &ContentHash,
    ) -> Result<bool, StorageError>;

    /// Inserts or overwrites the record for the file's key
    async fn upsert_synced_file(&self, record: &SyncedFile) -> Result<(), StorageError>;

    async fn get_synced_file(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
    ) -> Result<Option<SyncedFile>, StorageError>;

    /// Updates status and error message of an existing record
    ///
    /// Returns false when no record matched.
    async fn update_file_status(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
        status: FileStatus,
        error: Option<&str>,
    ) -> Result<bool, StorageError>;

    /// Deletes one record, returning whether it existed
    async fn delete_synced_file(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
        local_path: &str,
    ) -> Result<bool, StorageError>;

    async fn get_stats(&self, tenant: &TenantId) -> Result<LedgerStats, StorageError>;

    /// All records of a mapping, ordered by local path
    async fn get_synced_files_for_mapping(
        &self,
        tenant: &TenantId,
        mapping: &MappingId,
    ) -> Result<Vec<SyncedFile>, StorageError>;

    /// Records with status `failed`, optionally narrowed to one mapping
    async fn get_failed_files(
        &self,
        tenant: &TenantId,
        mapping: Option<&MappingId>,
    ) -> Result<Vec<SyncedFile>, StorageError>;

    /// Removes file records and jobs of a tenant (or one of its mappings)
    ///
    /// Returns the number of rows removed across both tables.
    async fn clear_history(
        &self,
        tenant: &TenantId,
        mapping: Option<&MappingId>,
    ) -> Result<u64, StorageError>;

    // --- Jobs ---

    /// Creates and persists a pending job with zero counters
    async fn create_job(
        &self,
        tenant: &TenantId,
        mapping: Option<&MappingId>,
    ) -> Result<SyncJob, StorageError>;

    /// Sets the totals and moves the job to running
    async fn set_job_totals(
        &self,
        id: JobId,
        files_total: u64,
        bytes_total: u64,
    ) -> Result<(), StorageError>;

    /// Adds the deltas to the job counters
    async fn update_job_progress(
        &self,
        id: JobId,
        processed_delta: u64,
        bytes_delta: u64,
        failed_delta: u64,
    ) -> Result<(), StorageError>;

    /// Marks the job terminal with its error list
    ///
    /// # Errors
    /// [`StorageError::JobFinished`] if the job is already terminal,
    /// [`StorageError::InvalidTransition`] if `status` is not terminal.
    async fn complete_job(
        &self,
        id: JobId,
        status: JobStatus,
        errors: &[SyncError],
    ) -> Result<(), StorageError>;

    async fn get_job(&self, id: JobId) -> Result<Option<SyncJob>, StorageError>;

    /// Most recent jobs first, optionally narrowed to one tenant
    async fn get_recent_jobs(
        &self,
        tenant: Option<&TenantId>,
        limit: u32,
    ) -> Result<Vec<SyncJob>, StorageError>;
}
