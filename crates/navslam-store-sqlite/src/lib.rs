// crates/navslam-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Job Store
// Description: Durable JobStatusStore backend using SQLite WAL.
// Purpose: Persist map job status across process restarts.
// Dependencies: navslam-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`JobStatusStore`] implementation. The
//! current status of each job lives in one row; every status write is also
//! appended to an event table so job history is never lost. Lock contention
//! surfaces as a transient error the job queue retries.
//!
//! [`JobStatusStore`]: navslam_core::JobStatusStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJobStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
