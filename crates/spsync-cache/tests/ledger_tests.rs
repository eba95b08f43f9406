//! Integration tests for SqliteSyncLedger
//!
//! These tests verify all ISyncLedger methods using an in-memory
//! SQLite database. Each test function creates a fresh database to
//! ensure test isolation.

use chrono::{Duration, Utc};

use spsync_cache::{DatabasePool, SqliteSyncLedger};
use spsync_core::domain::{
    ContentHash, FileStatus, JobId, JobStatus, MappingId, SyncError, SyncedFile, TenantId,
};
use spsync_core::ports::{ISyncLedger, StorageError};

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory ledger for each test
async fn setup() -> SqliteSyncLedger {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteSyncLedger::new(pool.pool().clone())
}

fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

fn mapping(id: &str) -> MappingId {
    MappingId::new(id).unwrap()
}

fn hash(c: char) -> ContentHash {
    ContentHash::new(c.to_string().repeat(64)).unwrap()
}

fn record(t: &str, m: &str, path: &str, h: char, status: FileStatus) -> SyncedFile {
    SyncedFile {
        tenant_id: tenant(t),
        mapping_id: mapping(m),
        local_path: path.to_string(),
        remote_path: format!("/{path}"),
        remote_id: format!("item-{path}"),
        content_hash: hash(h),
        size: 100,
        local_modified: Utc::now() - Duration::hours(1),
        remote_modified: Some(Utc::now()),
        synced_at: Utc::now(),
        status,
        error_message: None,
    }
}

// ============================================================================
// needs_sync
// ============================================================================

#[tokio::test]
async fn needs_sync_true_without_record() {
    let ledger = setup().await;
    assert!(ledger
        .needs_sync(&tenant("t1"), &mapping("m1"), "a.txt", &hash('a'))
        .await
        .unwrap());
}

#[tokio::test]
async fn needs_sync_false_for_synced_same_hash() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Synced))
        .await
        .unwrap();

    assert!(!ledger
        .needs_sync(&tenant("t1"), &mapping("m1"), "a.txt", &hash('a'))
        .await
        .unwrap());
}

#[tokio::test]
async fn needs_sync_true_for_changed_hash() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Synced))
        .await
        .unwrap();

    assert!(ledger
        .needs_sync(&tenant("t1"), &mapping("m1"), "a.txt", &hash('b'))
        .await
        .unwrap());
}

#[tokio::test]
async fn needs_sync_true_for_failed_record_with_same_hash() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Failed))
        .await
        .unwrap();

    assert!(ledger
        .needs_sync(&tenant("t1"), &mapping("m1"), "a.txt", &hash('a'))
        .await
        .unwrap());
}

#[tokio::test]
async fn needs_sync_is_scoped_by_tenant_and_mapping() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Synced))
        .await
        .unwrap();

    assert!(ledger
        .needs_sync(&tenant("t1"), &mapping("m2"), "a.txt", &hash('a'))
        .await
        .unwrap());
    assert!(ledger
        .needs_sync(&tenant("t2"), &mapping("m1"), "a.txt", &hash('a'))
        .await
        .unwrap());
}

// ============================================================================
// File records
// ============================================================================

#[tokio::test]
async fn upsert_overwrites_single_row() {
    let ledger = setup().await;
    let mut failed = record("t1", "m1", "docs/a.txt", 'a', FileStatus::Failed);
    failed.remote_path = String::new();
    failed.remote_id = String::new();
    failed.error_message = Some("boom".to_string());
    ledger.upsert_synced_file(&failed).await.unwrap();

    let synced = record("t1", "m1", "docs/a.txt", 'b', FileStatus::Synced);
    ledger.upsert_synced_file(&synced).await.unwrap();

    let rows = ledger
        .get_synced_files_for_mapping(&tenant("t1"), &mapping("m1"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.status, FileStatus::Synced);
    assert_eq!(row.content_hash, hash('b'));
    assert_eq!(row.remote_id, "item-docs/a.txt");
    assert!(row.error_message.is_none());
}

#[tokio::test]
async fn get_synced_file_roundtrips_fields() {
    let ledger = setup().await;
    let original = record("t1", "m1", "b/c.txt", 'c', FileStatus::Synced);
    ledger.upsert_synced_file(&original).await.unwrap();

    let loaded = ledger
        .get_synced_file(&tenant("t1"), &mapping("m1"), "b/c.txt")
        .await
        .unwrap()
        .expect("record exists");

    assert_eq!(loaded.local_path, original.local_path);
    assert_eq!(loaded.remote_path, "/b/c.txt");
    assert_eq!(loaded.size, 100);
    assert_eq!(loaded.status, FileStatus::Synced);
    // Stored with microsecond precision
    assert!((loaded.synced_at - original.synced_at).num_milliseconds().abs() < 1);
    assert!(loaded.remote_modified.is_some());

    assert!(ledger
        .get_synced_file(&tenant("t1"), &mapping("m1"), "missing.txt")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn update_file_status_sets_error() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Synced))
        .await
        .unwrap();

    let updated = ledger
        .update_file_status(
            &tenant("t1"),
            &mapping("m1"),
            "a.txt",
            FileStatus::Failed,
            Some("quota exceeded"),
        )
        .await
        .unwrap();
    assert!(updated);

    let row = ledger
        .get_synced_file(&tenant("t1"), &mapping("m1"), "a.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, FileStatus::Failed);
    assert_eq!(row.error_message.as_deref(), Some("quota exceeded"));

    let missing = ledger
        .update_file_status(&tenant("t1"), &mapping("m1"), "x", FileStatus::Synced, None)
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn delete_synced_file_removes_one_row() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Synced))
        .await
        .unwrap();
    ledger
        .upsert_synced_file(&record("t1", "m1", "b.txt", 'b', FileStatus::Synced))
        .await
        .unwrap();

    assert!(ledger
        .delete_synced_file(&tenant("t1"), &mapping("m1"), "a.txt")
        .await
        .unwrap());
    assert!(!ledger
        .delete_synced_file(&tenant("t1"), &mapping("m1"), "a.txt")
        .await
        .unwrap());

    let rows = ledger
        .get_synced_files_for_mapping(&tenant("t1"), &mapping("m1"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].local_path, "b.txt");
}

#[tokio::test]
async fn get_stats_counts_by_status() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Synced))
        .await
        .unwrap();
    ledger
        .upsert_synced_file(&record("t1", "m2", "b.txt", 'b', FileStatus::Synced))
        .await
        .unwrap();
    ledger
        .upsert_synced_file(&record("t1", "m1", "c.txt", 'c', FileStatus::Failed))
        .await
        .unwrap();
    ledger
        .upsert_synced_file(&record("t2", "m1", "d.txt", 'd', FileStatus::Synced))
        .await
        .unwrap();

    let stats = ledger.get_stats(&tenant("t1")).await.unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.synced, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.synced_bytes, 200);
    assert!(stats.last_sync.is_some());

    let empty = ledger.get_stats(&tenant("nobody")).await.unwrap();
    assert_eq!(empty.total_files, 0);
    assert!(empty.last_sync.is_none());
}

#[tokio::test]
async fn get_failed_files_filters_by_mapping() {
    let ledger = setup().await;
    ledger
        .upsert_synced_file(&record("t1", "m1", "a.txt", 'a', FileStatus::Failed))
        .await
        .unwrap();
    ledger
        .upsert_synced_file(&record("t1", "m2", "b.txt", 'b', FileStatus::Failed))
        .await
        .unwrap();
    ledger
        .upsert_synced_file(&record("t1", "m1", "c.txt", 'c', FileStatus::Synced))
        .await
        .unwrap();

    let all = ledger.get_failed_files(&tenant("t1"), None).await.unwrap();
    assert_eq!(all.len(), 2);

    let m1 = ledger
        .get_failed_files(&tenant("t1"), Some(&mapping("m1")))
        .await
        .unwrap();
    assert_eq!(m1.len(), 1);
    assert_eq!(m1[0].local_path, "a.txt");
}

// ============================================================================
// clear_history
// ============================================================================

#[tokio::test]
async fn clear_history_for_mapping_keeps_other_rows() {
    let ledger = setup().await;
    for (t, m, p) in [("t1", "m1", "a"), ("t1", "m2", "b"), ("t2", "m1", "c")] {
        ledger
            .upsert_synced_file(&record(t, m, p, 'a', FileStatus::Synced))
            .await
            .unwrap();
    }
    ledger
        .create_job(&tenant("t1"), Some(&mapping("m1")))
        .await
        .unwrap();
    ledger
        .create_job(&tenant("t1"), Some(&mapping("m2")))
        .await
        .unwrap();

    let removed = ledger
        .clear_history(&tenant("t1"), Some(&mapping("m1")))
        .await
        .unwrap();
    assert_eq!(removed, 2);

    assert!(ledger
        .get_synced_files_for_mapping(&tenant("t1"), &mapping("m1"))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        ledger
            .get_synced_files_for_mapping(&tenant("t1"), &mapping("m2"))
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        ledger
            .get_recent_jobs(Some(&tenant("t1")), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn clear_history_for_tenant_removes_everything_of_tenant() {
    let ledger = setup().await;
    for (t, m, p) in [("t1", "m1", "a"), ("t1", "m2", "b"), ("t2", "m1", "c")] {
        ledger
            .upsert_synced_file(&record(t, m, p, 'a', FileStatus::Synced))
            .await
            .unwrap();
    }
    ledger.create_job(&tenant("t1"), None).await.unwrap();
    ledger.create_job(&tenant("t2"), None).await.unwrap();

    let removed = ledger.clear_history(&tenant("t1"), None).await.unwrap();
    assert_eq!(removed, 3);

    assert_eq!(ledger.get_stats(&tenant("t1")).await.unwrap().total_files, 0);
    assert_eq!(ledger.get_stats(&tenant("t2")).await.unwrap().total_files, 1);
    assert_eq!(ledger.get_recent_jobs(None, 10).await.unwrap().len(), 1);
}

// ============================================================================
// Jobs
// ============================================================================

#[tokio::test]
async fn job_lifecycle() {
    let ledger = setup().await;
    let job = ledger
        .create_job(&tenant("t1"), Some(&mapping("m1")))
        .await
        .unwrap();
    assert_eq!(job.status(), JobStatus::Pending);

    ledger.set_job_totals(job.id(), 3, 300).await.unwrap();
    ledger.update_job_progress(job.id(), 1, 100, 0).await.unwrap();
    ledger.update_job_progress(job.id(), 1, 100, 0).await.unwrap();
    ledger.update_job_progress(job.id(), 0, 0, 1).await.unwrap();

    let running = ledger.get_job(job.id()).await.unwrap().unwrap();
    assert_eq!(running.status(), JobStatus::Running);
    assert_eq!(running.counters().files_total, 3);
    assert_eq!(running.counters().bytes_total, 300);
    assert_eq!(running.counters().files_processed, 2);
    assert_eq!(running.counters().bytes_transferred, 200);
    assert_eq!(running.counters().files_failed, 1);

    let errors = vec![SyncError::new("c.txt", "Server error (503): busy", 3)];
    ledger
        .complete_job(job.id(), JobStatus::Completed, &errors)
        .await
        .unwrap();

    let done = ledger.get_job(job.id()).await.unwrap().unwrap();
    assert_eq!(done.status(), JobStatus::Completed);
    assert!(done.completed_at().is_some());
    assert_eq!(done.errors().len(), 1);
    assert_eq!(done.errors()[0].file_path, "c.txt");
    assert_eq!(done.errors()[0].retry_count, 3);
    assert_eq!(done.mapping_id(), Some(&mapping("m1")));
}

#[tokio::test]
async fn finished_job_is_immutable() {
    let ledger = setup().await;
    let job = ledger.create_job(&tenant("t1"), None).await.unwrap();
    ledger
        .complete_job(job.id(), JobStatus::Failed, &[])
        .await
        .unwrap();

    let err = ledger
        .complete_job(job.id(), JobStatus::Completed, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::JobFinished(_)));

    let err = ledger
        .update_job_progress(job.id(), 1, 1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::JobFinished(_)));

    let stored = ledger.get_job(job.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), JobStatus::Failed);
    assert_eq!(stored.counters().files_processed, 0);
}

#[tokio::test]
async fn complete_job_rejects_non_terminal_status() {
    let ledger = setup().await;
    let job = ledger.create_job(&tenant("t1"), None).await.unwrap();
    let err = ledger
        .complete_job(job.id(), JobStatus::Running, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition(_)));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let ledger = setup().await;
    let id = JobId::new();
    assert!(ledger.get_job(id).await.unwrap().is_none());
    let err = ledger.set_job_totals(id, 1, 1).await.unwrap_err();
    assert!(matches!(err, StorageError::JobNotFound(_)));
}

#[tokio::test]
async fn recent_jobs_newest_first_with_limit() {
    let ledger = setup().await;
    let first = ledger.create_job(&tenant("t1"), None).await.unwrap();
    let second = ledger.create_job(&tenant("t1"), None).await.unwrap();
    let third = ledger.create_job(&tenant("t1"), None).await.unwrap();
    ledger.create_job(&tenant("t2"), None).await.unwrap();

    let jobs = ledger.get_recent_jobs(Some(&tenant("t1")), 2).await.unwrap();
    let ids: Vec<JobId> = jobs.iter().map(|j| j.id()).collect();
    assert_eq!(ids, vec![third.id(), second.id()]);
    assert!(!ids.contains(&first.id()));

    assert_eq!(ledger.get_recent_jobs(None, 10).await.unwrap().len(), 4);
}

#[tokio::test]
async fn concurrent_progress_updates_are_not_lost() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = DatabasePool::new(&dir.path().join("ledger.db")).await.unwrap();
    let ledger = SqliteSyncLedger::new(pool.pool().clone());

    let job = ledger.create_job(&tenant("t1"), None).await.unwrap();
    ledger.set_job_totals(job.id(), 20, 2000).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        let id = job.id();
        handles.push(tokio::spawn(async move {
            ledger.update_job_progress(id, 1, 100, 0).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = ledger.get_job(job.id()).await.unwrap().unwrap();
    assert_eq!(stored.counters().files_processed, 20);
    assert_eq!(stored.counters().bytes_transferred, 2000);
}
