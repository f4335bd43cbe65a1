// crates/navslam-engine/src/errors.rs
// ============================================================================
// Module: Engine Errors
// Description: Error taxonomy for the build and localization pipelines.
// Purpose: Carry codec, database, process, and interpreter failures upward.
// Dependencies: navslam-core, thiserror
// ============================================================================

//! ## Overview
//! [`EngineError`] aggregates every failure a pipeline step can raise. Codec
//! and supervisor errors pass through unchanged so callers can still match on
//! `Timeout`, `EngineFailure`, `MalformedRecord` and `NoMatch`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use navslam_core::CodecError;
use navslam_core::DatabaseError;
use navslam_core::InterpretError;
use thiserror::Error;

use crate::supervisor::SupervisorError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline and map directory errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Binary record or parameter failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Map database build or read failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// Engine process failure.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// Localization output contained no usable match.
    #[error(transparent)]
    Interpret(#[from] InterpretError),
    /// Requested map does not exist.
    #[error("map not found: {0}")]
    MapNotFound(String),
    /// Map id is not usable as a file stem.
    #[error("invalid map id: {0}")]
    InvalidMapId(String),
    /// Localization request is malformed.
    #[error("invalid localization query: {0}")]
    InvalidQuery(String),
    /// Engine exited cleanly without writing its output.
    #[error("engine output not created: {}", .0.display())]
    MissingOutput(PathBuf),
    /// Capture session cannot be used.
    #[error("capture session error: {0}")]
    Session(String),
    /// Filesystem failure outside the map database.
    #[error("engine io error: {0}")]
    Io(String),
    /// Blocking worker task failed to complete.
    #[error("background task failed: {0}")]
    Join(String),
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Join(error.to_string())
    }
}
