// crates/navslam-core/src/interfaces/mod.rs
// ============================================================================
// Module: navslam Interfaces
// Description: Backend-agnostic contract for durable job status.
// Purpose: Decouple the job queue from the store that tracks job rows.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The job queue reads and writes job status only through
//! [`JobStatusStore`]. The store owns its schema; callers never create or
//! alter it. Errors are classified as transient (retried by the queue) or
//! permanent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::JobKey;
use crate::core::JobRecord;
use crate::core::JobStatus;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Job status store errors.
///
/// # Invariants
/// - `Unavailable` and `Busy` are transient; every other variant is permanent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store cannot be reached right now.
    #[error("job store unavailable: {0}")]
    Unavailable(String),
    /// Store is locked by another writer.
    #[error("job store busy: {0}")]
    Busy(String),
    /// Request or stored data is invalid.
    #[error("job store invalid data: {0}")]
    Invalid(String),
    /// Stored data failed integrity checks.
    #[error("job store corruption: {0}")]
    Corrupt(String),
    /// Store reported an error.
    #[error("job store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true when retrying the operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Busy(_))
    }
}

// ============================================================================
// SECTION: Job Status Store
// ============================================================================

/// Durable job status contract.
pub trait JobStatusStore: Send + Sync {
    /// Writes the status of `key`, creating the row when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_status(
        &self,
        key: &JobKey,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Reads the status row of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn read_status(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError>;

    /// Reports store readiness.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
