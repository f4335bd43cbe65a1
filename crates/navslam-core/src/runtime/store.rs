// crates/navslam-core/src/runtime/store.rs
// ============================================================================
// Module: navslam In-Memory Job Store
// Description: Mutex-guarded job status map for tests and local runs.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryJobStore`] implements [`JobStatusStore`] over a shared map and
//! additionally records every status transition so tests can assert the exact
//! lifecycle a job went through. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::JobKey;
use crate::core::JobRecord;
use crate::core::JobStatus;
use crate::interfaces::JobStatusStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Shared state behind [`InMemoryJobStore`].
#[derive(Debug, Default)]
struct StoreState {
    /// Latest row per job.
    rows: BTreeMap<JobKey, JobRecord>,
    /// Every status write in arrival order.
    history: Vec<(JobKey, JobStatus)>,
}

/// In-memory job status store for tests and local tooling.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobStore {
    /// State protected by a mutex.
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded status transition for `key`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the mutex is poisoned.
    pub fn history(&self, key: &JobKey) -> Result<Vec<JobStatus>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.history.iter().filter(|(k, _)| k == key).map(|(_, status)| *status).collect())
    }

    /// Returns all rows ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the mutex is poisoned.
    pub fn records(&self) -> Result<Vec<JobRecord>, StoreError> {
        Ok(self.lock()?.rows.values().cloned().collect())
    }

    /// Acquires the state lock.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("job store mutex poisoned".to_string()))
    }
}

impl JobStatusStore for InMemoryJobStore {
    fn update_status(
        &self,
        key: &JobKey,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.rows.insert(
            key.clone(),
            JobRecord {
                key: key.clone(),
                status,
                error_message: error_message.map(ToString::to_string),
                updated_at_ms: unix_millis(),
            },
        );
        guard.history.push((key.clone(), status));
        Ok(())
    }

    fn read_status(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.lock()?.rows.get(key).cloned())
    }
}

/// Returns the current unix time in milliseconds, saturating on overflow.
fn unix_millis() -> i64 {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis());
    i64::try_from(millis).unwrap_or(i64::MAX)
}
