//! Sync orchestrator
//!
//! The [`SyncEngine`] runs one job per mapping:
//!
//! 1. **Scan**: inventory the source tree (`scanning` events)
//! 2. **Select**: keep files the ledger reports as needing sync
//! 3. **Resolve**: site and library, once per run
//! 4. **Upload**: ensure parent folders, upload, record each outcome
//!    (`uploading` events)
//! 5. **Finalize**: completed / failed / cancelled (`complete` event)
//!
//! ## Retry Logic
//!
//! Transient remote errors (throttling, server errors, network) are retried
//! per operation with exponential backoff, `retry_delay_ms * 2^n`, up to the
//! mapping's `retry_attempts`. Rejected credentials are never retried: the
//! first `Auth` error stops the run and is recorded once on the job.
//!
//! ## Ordering
//!
//! Uploads fan out up to `max_concurrent_uploads`, but results are consumed
//! in scan order on the orchestrating task, which alone writes the ledger
//! and the job counters.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use spsync_core::domain::{
    FileStatus, JobId, JobStatus, MappingId, RemotePath, SyncError, SyncJob, SyncMapping,
    SyncedFile, Tenant, TenantId,
};
use spsync_core::ports::{
    Drive, IConfigStore, IRemoteConnector, IRemoteStore, ISyncLedger, RemoteError, RemoteItem,
    UploadContent,
};

use crate::scanner::{self, ScannedFile};
use crate::EngineError;

/// Upper bound for a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ============================================================================
// Progress
// ============================================================================

/// Phase of a mapping run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Scanning,
    Uploading,
    Complete,
    Error,
}

/// A progress event emitted during a mapping run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub mapping_id: MappingId,
    /// Relative path of the file being scanned or uploaded
    pub current_file: Option<String>,
    pub phase: SyncPhase,
    pub files_processed: u64,
    pub files_total: u64,
}

/// Progress listener shared with the engine
pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

// ============================================================================
// Dry run
// ============================================================================

/// What a sync would do, computed without remote calls or ledger writes
#[derive(Debug, Clone)]
pub struct DryRunReport {
    /// Files that would be uploaded, in scan order
    pub files: Vec<ScannedFile>,
    /// Files whose ledger record is current
    pub up_to_date: usize,
    /// Sum of the sizes of `files`
    pub total_bytes: u64,
}

// ============================================================================
// Retry
// ============================================================================

fn backoff_delay(base: Duration, attempt: u32, err: &RemoteError) -> Duration {
    let exponential = base
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF);
    match err {
        RemoteError::Throttled { retry_after_secs } if *retry_after_secs > 0 => {
            Duration::from_secs(*retry_after_secs).min(MAX_BACKOFF).max(exponential)
        }
        _ => exponential,
    }
}

/// Runs `f` until it succeeds, fails permanently, or `max_retries` retries
/// are spent. Returns the result and the number of retries made.
async fn with_retry<F, Fut, T>(
    operation: &str,
    max_retries: u32,
    base_delay: Duration,
    f: F,
) -> (Result<T, RemoteError>, u32)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return (Ok(value), attempt);
            }
            Err(err) if err.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(base_delay, attempt, &err);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

// ============================================================================
// Per-run state
// ============================================================================

/// Remote destination resolved once per run
struct Destination {
    store: Arc<dyn IRemoteStore>,
    drive: Drive,
    root: RemotePath,
    /// Folders known to exist, guarded so creation is serialized
    ensured: Mutex<HashSet<RemotePath>>,
}

/// Outcome of one file's upload
struct FileOutcome {
    remote_path: RemotePath,
    result: Result<RemoteItem, RemoteError>,
    retries: u32,
}

/// Remote path of a scanned file under the destination root
fn destination_path(
    root: &RemotePath,
    file: &ScannedFile,
    preserve_folder_structure: bool,
) -> Result<RemotePath, RemoteError> {
    let invalid = |e: spsync_core::domain::DomainError| RemoteError::Upload(e.to_string());
    if preserve_folder_structure {
        file.relative_path
            .split('/')
            .try_fold(root.clone(), |path, segment| path.join(segment))
            .map_err(invalid)
    } else {
        root.join(&file.name).map_err(invalid)
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Orchestrates scanner, ledger and remote store for mapping runs
pub struct SyncEngine {
    config: Arc<dyn IConfigStore>,
    ledger: Arc<dyn ISyncLedger>,
    connector: Arc<dyn IRemoteConnector>,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        config: Arc<dyn IConfigStore>,
        ledger: Arc<dyn ISyncLedger>,
        connector: Arc<dyn IRemoteConnector>,
    ) -> Self {
        Self {
            config,
            ledger,
            connector,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Registers a progress listener
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Uses `token` to stop runs between files
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, job: &SyncJob, mapping: &SyncMapping, phase: SyncPhase, file: Option<&str>) {
        if let Some(callback) = &self.progress {
            callback(SyncProgress {
                job_id: job.id(),
                tenant_id: job.tenant_id().clone(),
                mapping_id: mapping.id.clone(),
                current_file: file.map(str::to_string),
                phase,
                files_processed: job.counters().files_processed,
                files_total: job.counters().files_total,
            });
        }
    }

    async fn load_tenant(&self, tenant_id: &TenantId) -> Result<Tenant, EngineError> {
        self.config
            .get_tenant(tenant_id)
            .await
            .map_err(|e| EngineError::Config(format!("{e:#}")))?
            .ok_or_else(|| EngineError::TenantNotFound(tenant_id.clone()))
    }

    async fn load_mapping(
        &self,
        tenant_id: &TenantId,
        mapping_id: &MappingId,
    ) -> Result<(Tenant, SyncMapping), EngineError> {
        let tenant = self.load_tenant(tenant_id).await?;
        let mapping = self
            .config
            .get_mapping(tenant_id, mapping_id)
            .await
            .map_err(|e| EngineError::Config(format!("{e:#}")))?
            .ok_or_else(|| EngineError::MappingNotFound {
                tenant: tenant_id.clone(),
                mapping: mapping_id.clone(),
            })?;
        Ok((tenant, mapping))
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Runs one mapping and returns its finished job
    ///
    /// Remote and scan failures end up in the job. Configuration lookups
    /// and ledger failures are returned as errors; on a ledger failure the
    /// job is still marked failed when the ledger allows it.
    #[tracing::instrument(skip(self), fields(tenant = %tenant_id, mapping = %mapping_id))]
    pub async fn sync_mapping(
        &self,
        tenant_id: &TenantId,
        mapping_id: &MappingId,
    ) -> Result<SyncJob, EngineError> {
        let (tenant, mapping) = self.load_mapping(tenant_id, mapping_id).await?;
        self.run_mapping(&tenant, &mapping).await
    }

    /// Runs every enabled mapping of a tenant, one after another
    #[tracing::instrument(skip(self), fields(tenant = %tenant_id))]
    pub async fn sync_tenant(&self, tenant_id: &TenantId) -> Result<Vec<SyncJob>, EngineError> {
        let tenant = self.load_tenant(tenant_id).await?;
        if !tenant.enabled {
            warn!(tenant = %tenant.id, "Tenant is disabled, nothing to sync");
            return Ok(Vec::new());
        }
        self.run_tenant(&tenant).await
    }

    /// Runs every enabled mapping of every enabled tenant
    #[tracing::instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<Vec<SyncJob>, EngineError> {
        let tenants = self
            .config
            .list_tenants()
            .await
            .map_err(|e| EngineError::Config(format!("{e:#}")))?;

        let mut jobs = Vec::new();
        for tenant in tenants.iter().filter(|t| t.enabled) {
            jobs.extend(self.run_tenant(tenant).await?);
        }
        Ok(jobs)
    }

    /// Computes what [`SyncEngine::sync_mapping`] would upload
    pub async fn dry_run(
        &self,
        tenant_id: &TenantId,
        mapping_id: &MappingId,
    ) -> Result<DryRunReport, EngineError> {
        let (tenant, mapping) = self.load_mapping(tenant_id, mapping_id).await?;
        let scan = scanner::scan(&mapping, None).await?;

        let mut report = DryRunReport {
            files: Vec::new(),
            up_to_date: 0,
            total_bytes: 0,
        };
        for file in scan.files {
            let needed = self
                .ledger
                .needs_sync(&tenant.id, &mapping.id, &file.relative_path, &file.hash)
                .await?;
            if needed {
                report.total_bytes += file.size;
                report.files.push(file);
            } else {
                report.up_to_date += 1;
            }
        }

        info!(
            tenant = %tenant.id,
            mapping = %mapping.id,
            to_sync = report.files.len(),
            up_to_date = report.up_to_date,
            bytes = report.total_bytes,
            "Dry run finished"
        );
        Ok(report)
    }

    async fn run_tenant(&self, tenant: &Tenant) -> Result<Vec<SyncJob>, EngineError> {
        let mut jobs = Vec::new();
        for mapping in tenant.enabled_mappings() {
            jobs.push(self.run_mapping(tenant, mapping).await?);
        }
        Ok(jobs)
    }

    // ========================================================================
    // Mapping run
    // ========================================================================

    /// Runs one mapping under a new job and persists the final state
    pub async fn run_mapping(
        &self,
        tenant: &Tenant,
        mapping: &SyncMapping,
    ) -> Result<SyncJob, EngineError> {
        let mut job = self
            .ledger
            .create_job(&tenant.id, Some(&mapping.id))
            .await?;
        info!(
            job_id = %job.id(),
            tenant = %tenant.id,
            mapping = %mapping.id,
            source = %mapping.source_path.display(),
            "Starting sync"
        );

        let status = match self.execute(tenant, mapping, &mut job).await {
            Ok(cancelled) => {
                let status = job.outcome(cancelled);
                job.finish(status);
                self.emit(&job, mapping, SyncPhase::Complete, None);
                status
            }
            Err(EngineError::Storage(err)) => {
                error!(job_id = %job.id(), mapping = %mapping.id, error = %err, "Ledger write failed, aborting run");
                job.finish(JobStatus::Failed);
                if let Err(e) = self
                    .ledger
                    .complete_job(job.id(), JobStatus::Failed, job.errors())
                    .await
                {
                    warn!(job_id = %job.id(), error = %e, "Could not mark job as failed");
                }
                self.emit(&job, mapping, SyncPhase::Error, None);
                return Err(EngineError::Storage(err));
            }
            Err(err) => {
                error!(job_id = %job.id(), mapping = %mapping.id, error = %err, "Sync run failed");
                job.push_error(SyncError::new(
                    mapping.source_path.display().to_string(),
                    err.to_string(),
                    0,
                ));
                job.finish(JobStatus::Failed);
                self.emit(&job, mapping, SyncPhase::Error, None);
                JobStatus::Failed
            }
        };

        self.ledger
            .complete_job(job.id(), status, job.errors())
            .await?;

        let counters = job.counters();
        info!(
            job_id = %job.id(),
            status = %status,
            processed = counters.files_processed,
            failed = counters.files_failed,
            bytes = counters.bytes_transferred,
            "Sync finished"
        );
        Ok(job)
    }

    /// Body of a run; returns whether it was cancelled
    async fn execute(
        &self,
        tenant: &Tenant,
        mapping: &SyncMapping,
        job: &mut SyncJob,
    ) -> Result<bool, EngineError> {
        self.emit(job, mapping, SyncPhase::Scanning, None);
        let scan = {
            let job_view: &SyncJob = job;
            let on_file = |file: &ScannedFile| {
                self.emit(job_view, mapping, SyncPhase::Scanning, Some(&file.relative_path));
            };
            scanner::scan(mapping, Some(&on_file)).await?
        };

        let mut candidates = Vec::new();
        for file in scan.files {
            if self
                .ledger
                .needs_sync(&tenant.id, &mapping.id, &file.relative_path, &file.hash)
                .await?
            {
                candidates.push(file);
            }
        }

        let total_bytes: u64 = candidates.iter().map(|f| f.size).sum();
        job.set_totals(candidates.len() as u64, total_bytes);
        self.ledger
            .set_job_totals(job.id(), candidates.len() as u64, total_bytes)
            .await?;
        info!(
            job_id = %job.id(),
            files = candidates.len(),
            bytes = total_bytes,
            "Files needing sync"
        );

        if candidates.is_empty() {
            return Ok(false);
        }
        if self.cancel.is_cancelled() {
            return Ok(true);
        }

        let destination = self.resolve_destination(tenant, mapping).await?;
        self.upload_all(tenant, mapping, job, &destination, candidates)
            .await
    }

    async fn resolve_destination(
        &self,
        tenant: &Tenant,
        mapping: &SyncMapping,
    ) -> Result<Destination, EngineError> {
        let retries = mapping.retry_attempts;
        let delay = Duration::from_millis(mapping.retry_delay_ms);

        let store = self.connector.connect(tenant).await?;
        let (site, _) = with_retry("resolve_site", retries, delay, || {
            store.resolve_site(&mapping.site_url)
        })
        .await;
        let site = site?;
        let (drive, _) = with_retry("resolve_library", retries, delay, || {
            store.resolve_library(&site.id, &mapping.library)
        })
        .await;
        let drive = drive?;

        let root = mapping
            .destination_root()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let mut ensured = HashSet::new();
        if !root.is_root() {
            let (folder, _) = with_retry("ensure_folder", retries, delay, || {
                store.ensure_folder(&drive.id, &root)
            })
            .await;
            folder?;
            ensured.insert(root.clone());
        }

        debug!(site = %site.id, drive = %drive.id, root = %root, "Resolved destination");
        Ok(Destination {
            store,
            drive,
            root,
            ensured: Mutex::new(ensured),
        })
    }

    /// Makes sure `folder` exists, creating it at most once per run
    async fn ensure_parent(
        &self,
        mapping: &SyncMapping,
        destination: &Destination,
        folder: &RemotePath,
    ) -> (Result<(), RemoteError>, u32) {
        if folder.is_root() {
            return (Ok(()), 0);
        }
        let mut ensured = destination.ensured.lock().await;
        if ensured.contains(folder) {
            return (Ok(()), 0);
        }

        let (result, retries) = with_retry(
            "ensure_folder",
            mapping.retry_attempts,
            Duration::from_millis(mapping.retry_delay_ms),
            || destination.store.ensure_folder(&destination.drive.id, folder),
        )
        .await;
        if result.is_ok() {
            ensured.insert(folder.clone());
        }
        (result.map(|_| ()), retries)
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_one(
        &self,
        job_id: JobId,
        tenant: &Tenant,
        mapping: &SyncMapping,
        destination: &Destination,
        file: &ScannedFile,
        files_total: u64,
        files_started: u64,
    ) -> FileOutcome {
        if let Some(callback) = &self.progress {
            callback(SyncProgress {
                job_id,
                tenant_id: tenant.id.clone(),
                mapping_id: mapping.id.clone(),
                current_file: Some(file.relative_path.clone()),
                phase: SyncPhase::Uploading,
                files_processed: files_started,
                files_total,
            });
        }

        let remote_path =
            match destination_path(&destination.root, file, mapping.preserve_folder_structure) {
                Ok(path) => path,
                Err(err) => {
                    return FileOutcome {
                        remote_path: destination.root.clone(),
                        result: Err(err),
                        retries: 0,
                    }
                }
            };
        let parent = remote_path.parent().unwrap_or_else(RemotePath::root);

        let (ensured, folder_retries) = self.ensure_parent(mapping, destination, &parent).await;
        if let Err(err) = ensured {
            return FileOutcome {
                remote_path,
                result: Err(err),
                retries: folder_retries,
            };
        }

        let relative = file.relative_path.as_str();
        let on_progress = |sent: u64, total: u64| {
            debug!(path = relative, sent, total, "Upload progress");
        };
        let (result, retries) = with_retry(
            "upload_file",
            mapping.retry_attempts,
            Duration::from_millis(mapping.retry_delay_ms),
            || {
                destination.store.upload_file(
                    &destination.drive.id,
                    &parent,
                    &file.name,
                    UploadContent::File {
                        path: file.path.clone(),
                        size: file.size,
                    },
                    mapping.conflict_behavior,
                    Some(&on_progress),
                )
            },
        )
        .await;

        FileOutcome {
            remote_path,
            result,
            retries: folder_retries + retries,
        }
    }

    async fn upload_all(
        &self,
        tenant: &Tenant,
        mapping: &SyncMapping,
        job: &mut SyncJob,
        destination: &Destination,
        candidates: Vec<ScannedFile>,
    ) -> Result<bool, EngineError> {
        let job_id = job.id();
        let files_total = candidates.len() as u64;
        let concurrency = mapping.max_concurrent_uploads.max(1);
        let cancel = &self.cancel;

        let mut outcomes = std::pin::pin!(stream::iter(candidates.iter().enumerate())
            .take_while(|_| futures_util::future::ready(!cancel.is_cancelled()))
            .map(|(index, file)| async move {
                let outcome = self
                    .upload_one(
                        job_id,
                        tenant,
                        mapping,
                        destination,
                        file,
                        files_total,
                        index as u64,
                    )
                    .await;
                (file, outcome)
            })
            .buffered(concurrency));

        let mut consumed = 0usize;
        while let Some((file, outcome)) = outcomes.next().await {
            consumed += 1;
            if let Err(RemoteError::Auth(msg)) = &outcome.result {
                error!(job_id = %job_id, path = %file.relative_path, "Credentials rejected, aborting run");
                return Err(RemoteError::Auth(msg.clone()).into());
            }
            self.record_outcome(tenant, mapping, job, file, outcome)
                .await?;
        }

        let cancelled = consumed < candidates.len();
        if cancelled {
            warn!(
                job_id = %job_id,
                remaining = candidates.len() - consumed,
                "Sync cancelled"
            );
        }
        Ok(cancelled)
    }

    /// Writes one outcome to the ledger and the job, on the orchestrating task
    async fn record_outcome(
        &self,
        tenant: &Tenant,
        mapping: &SyncMapping,
        job: &mut SyncJob,
        file: &ScannedFile,
        outcome: FileOutcome,
    ) -> Result<(), EngineError> {
        let mut record = SyncedFile {
            tenant_id: tenant.id.clone(),
            mapping_id: mapping.id.clone(),
            local_path: file.relative_path.clone(),
            remote_path: String::new(),
            remote_id: String::new(),
            content_hash: file.hash.clone(),
            size: file.size,
            local_modified: file.modified,
            remote_modified: None,
            synced_at: Utc::now(),
            status: FileStatus::Failed,
            error_message: None,
        };

        match outcome.result {
            Ok(item) => {
                debug!(path = %file.relative_path, remote = %outcome.remote_path, id = %item.id, "Uploaded");
                record.remote_path = outcome.remote_path.to_string();
                record.remote_id = item.id;
                record.remote_modified = item.last_modified;
                record.status = FileStatus::Synced;
                self.ledger.upsert_synced_file(&record).await?;

                job.record_success(file.size);
                self.ledger
                    .update_job_progress(job.id(), 1, file.size, 0)
                    .await?;
            }
            Err(err) => {
                warn!(path = %file.relative_path, error = %err, retries = outcome.retries, "Upload failed");
                record.error_message = Some(err.to_string());
                self.ledger.upsert_synced_file(&record).await?;

                job.record_failure(SyncError::new(
                    file.relative_path.clone(),
                    err.to_string(),
                    outcome.retries,
                ));
                self.ledger.update_job_progress(job.id(), 0, 0, 1).await?;
            }
        }
        Ok(())
    }
}
