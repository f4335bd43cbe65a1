// crates/navslam-core/src/core/jobs.rs
// ============================================================================
// Module: Map Job Types
// Description: Job identifiers, lifecycle states, and durable status rows.
// Purpose: Share job vocabulary between the queue and status stores.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A map job is identified by its building/session key. Status moves
//! `queued -> in_progress -> {completed | failed}` and rows are never deleted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Job Key
// ============================================================================

/// Building or session key identifying a map job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Creates a new job key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Job Status
// ============================================================================

/// Durable job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting for the worker.
    Queued,
    /// Currently running on the worker.
    InProgress,
    /// Finished and map persisted.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "queued" => Some(Self::Queued),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Job Record
// ============================================================================

/// Durable status row for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job key.
    pub key: JobKey,
    /// Current status.
    pub status: JobStatus,
    /// Failure description when `status` is `failed`.
    pub error_message: Option<String>,
    /// Last update time in unix milliseconds.
    pub updated_at_ms: i64,
}
