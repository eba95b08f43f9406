//! SyncJob domain entity
//!
//! A job records one orchestrator run over a mapping (or a tenant when no
//! mapping is given). It is created pending, moves to running once totals are
//! known, accumulates counters and errors, and is finalized exactly once.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{JobId, MappingId, TenantId};

/// Status of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, totals not yet known
    #[default]
    Pending,
    /// Uploading
    Running,
    /// Finished with no errors or at least one success
    Completed,
    /// Every attempted file failed, or the run aborted
    Failed,
    /// Stopped by a cancellation request
    Cancelled,
}

impl JobStatus {
    /// Storage representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true for completed, failed and cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// An error recorded against a job for a specific file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    pub file_path: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncError {
    /// Creates a new SyncError stamped with the current time
    pub fn new(file_path: impl Into<String>, message: impl Into<String>, retry_count: u32) -> Self {
        Self {
            file_path: file_path.into(),
            message: message.into(),
            timestamp: Utc::now(),
            retry_count,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.file_path,
            self.message
        )
    }
}

/// Job counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub files_total: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    pub bytes_total: u64,
    pub bytes_transferred: u64,
}

/// A single orchestrator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    id: JobId,
    tenant_id: TenantId,
    mapping_id: Option<MappingId>,
    status: JobStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    counters: JobCounters,
    errors: Vec<SyncError>,
}

impl SyncJob {
    /// Creates a new pending job with zero counters
    pub fn new(tenant_id: TenantId, mapping_id: Option<MappingId>) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            mapping_id,
            status: JobStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            counters: JobCounters::default(),
            errors: Vec::new(),
        }
    }

    /// Reconstitutes a job from storage
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: JobId,
        tenant_id: TenantId,
        mapping_id: Option<MappingId>,
        status: JobStatus,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        counters: JobCounters,
        errors: Vec<SyncError>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            mapping_id,
            status,
            started_at,
            completed_at,
            counters,
            errors,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn mapping_id(&self) -> Option<&MappingId> {
        self.mapping_id.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn counters(&self) -> &JobCounters {
        &self.counters
    }

    pub fn errors(&self) -> &[SyncError] {
        &self.errors
    }

    /// Sets the candidate totals and moves the job to running
    pub fn set_totals(&mut self, files_total: u64, bytes_total: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.counters.files_total = files_total;
        self.counters.bytes_total = bytes_total;
        self.status = JobStatus::Running;
    }

    /// Counts one successfully transferred file
    pub fn record_success(&mut self, bytes: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.counters.files_processed += 1;
        self.counters.bytes_transferred += bytes;
    }

    /// Counts one failed file and appends its error
    pub fn record_failure(&mut self, error: SyncError) {
        if self.status.is_terminal() {
            return;
        }
        self.counters.files_failed += 1;
        self.errors.push(error);
    }

    /// Appends a job-level error without touching the file counters
    pub fn push_error(&mut self, error: SyncError) {
        if self.status.is_terminal() {
            return;
        }
        self.errors.push(error);
    }

    /// Computes the terminal status for the job as it stands
    ///
    /// Partial success counts as completed; the job only fails when every
    /// attempted file failed.
    pub fn outcome(&self, cancelled: bool) -> JobStatus {
        if cancelled {
            JobStatus::Cancelled
        } else if self.errors.is_empty() || self.counters.files_processed > 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }

    /// Marks the job terminal with `status`
    ///
    /// Only the first call has any effect.
    pub fn finish(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}
