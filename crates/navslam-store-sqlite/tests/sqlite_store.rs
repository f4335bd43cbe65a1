// crates/navslam-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Job Store Tests
// Description: Validate SQLite JobStatusStore behavior.
// Purpose: Ensure durable status rows, history, and error classification.
// Dependencies: navslam-store-sqlite, navslam-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Conformance tests for the SQLite-backed job status store. Covers the
//! status contract, persistence across reopen, append-only history, and the
//! mapping of tampered or contended storage onto store errors.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::thread;

use navslam_core::JobKey;
use navslam_core::JobStatus;
use navslam_core::JobStatusStore;
use navslam_core::StoreError;
use navslam_store_sqlite::SqliteJobStore;
use navslam_store_sqlite::SqliteStoreConfig;
use navslam_store_sqlite::SqliteStoreError;
use navslam_store_sqlite::SqliteStoreMode;
use navslam_store_sqlite::SqliteSyncMode;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn store_for(path: &Path) -> SqliteJobStore {
    SqliteJobStore::new(&SqliteStoreConfig::at(path)).expect("store init")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn sqlite_store_roundtrip() -> Result<(), StoreError> {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("jobs.db"));
    let key = JobKey::new("building-7");
    store.update_status(&key, JobStatus::Queued, None)?;
    let record = store.read_status(&key)?.unwrap();
    assert_eq!(record.key, key);
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(record.error_message, None);
    assert!(record.updated_at_ms > 0);
    Ok(())
}

#[test]
fn sqlite_store_returns_none_for_missing_job() -> Result<(), StoreError> {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("jobs.db"));
    assert_eq!(store.read_status(&JobKey::new("nothing"))?, None);
    store.readiness()?;
    Ok(())
}

#[test]
fn sqlite_store_persists_across_instances() -> Result<(), StoreError> {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("jobs.db");
    let key = JobKey::new("building-7");
    {
        let store = store_for(&path);
        store.update_status(&key, JobStatus::InProgress, None)?;
        store.update_status(&key, JobStatus::Failed, Some("engine timed out after 600s"))?;
    }
    let reopened = store_for(&path);
    let record = reopened.read_status(&key)?.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("engine timed out after 600s"));
    Ok(())
}

#[test]
fn sqlite_store_clears_error_on_later_success() -> Result<(), StoreError> {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("jobs.db"));
    let key = JobKey::new("building-7");
    store.update_status(&key, JobStatus::Failed, Some("boom"))?;
    store.update_status(&key, JobStatus::Completed, None)?;
    assert_eq!(store.read_status(&key)?.unwrap().error_message, None);
    Ok(())
}

#[test]
fn sqlite_store_keeps_full_history() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("jobs.db"));
    let key = JobKey::new("building-7");
    for status in [JobStatus::Queued, JobStatus::InProgress, JobStatus::Completed] {
        store.update_status(&key, status, None).unwrap();
    }
    store.update_status(&JobKey::new("other"), JobStatus::Queued, None).unwrap();
    assert_eq!(
        store.history(&key).unwrap(),
        vec![JobStatus::Queued, JobStatus::InProgress, JobStatus::Completed]
    );
}

#[test]
fn sqlite_store_lists_jobs_by_key() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("jobs.db"));
    store.update_status(&JobKey::new("b"), JobStatus::Queued, None).unwrap();
    store.update_status(&JobKey::new("a"), JobStatus::Completed, None).unwrap();
    let keys: Vec<String> =
        store.list_jobs().unwrap().into_iter().map(|record| record.key.to_string()).collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[test]
fn sqlite_store_rejects_empty_key() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("jobs.db"));
    let err = store.update_status(&JobKey::new(""), JobStatus::Queued, None).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(!err.is_transient());
}

#[test]
fn sqlite_store_detects_unknown_status_label() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("jobs.db");
    let store = store_for(&path);
    let key = JobKey::new("building-7");
    store.update_status(&key, JobStatus::Queued, None).unwrap();

    let connection = rusqlite::Connection::open(&path).unwrap();
    connection
        .execute("UPDATE map_jobs SET status = 'running' WHERE job_key = ?1", ["building-7"])
        .unwrap();
    drop(connection);

    let err = store.read_status(&key).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn sqlite_store_rejects_version_mismatch() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("jobs.db");
    drop(store_for(&path));
    let connection = rusqlite::Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);

    let result = SqliteJobStore::new(&SqliteStoreConfig::at(&path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

#[test]
fn sqlite_store_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let result = SqliteJobStore::new(&SqliteStoreConfig::at(temp.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_rejects_overlong_path_component() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a".repeat(300)).join("jobs.db");
    let result = SqliteJobStore::new(&SqliteStoreConfig::at(path));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_accepts_delete_journal_and_normal_sync() -> Result<(), StoreError> {
    let temp = TempDir::new().unwrap();
    let config = SqliteStoreConfig {
        path: temp.path().join("jobs.db"),
        busy_timeout_ms: 250,
        journal_mode: SqliteStoreMode::Delete,
        sync_mode: SqliteSyncMode::Normal,
    };
    let store = SqliteJobStore::new(&config).unwrap();
    store.update_status(&JobKey::new("k"), JobStatus::Queued, None)?;
    assert!(store.read_status(&JobKey::new("k"))?.is_some());
    Ok(())
}

#[test]
fn sqlite_store_classifies_busy_as_transient() {
    let err: StoreError = SqliteStoreError::Busy("database is locked".to_string()).into();
    assert!(err.is_transient());
    let err: StoreError = SqliteStoreError::Unavailable("cannot open".to_string()).into();
    assert!(err.is_transient());
    let err: StoreError = SqliteStoreError::VersionMismatch("2".to_string()).into();
    assert!(!err.is_transient());
}

#[test]
fn sqlite_store_allows_concurrent_writers() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(store_for(&temp.path().join("jobs.db")));
    let handles: Vec<_> = (0 .. 4)
        .map(|index| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let key = JobKey::new(format!("building-{index}"));
                store.update_status(&key, JobStatus::Queued, None).unwrap();
                store.update_status(&key, JobStatus::Completed, None).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let records = store.list_jobs().unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|record| record.status == JobStatus::Completed));
}
