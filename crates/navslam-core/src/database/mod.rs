// crates/navslam-core/src/database/mod.rs
// ============================================================================
// Module: Map Database Codec
// Description: Build input map databases and read processed ones.
// Purpose: Produce valid engine inputs and extract results deterministically.
// Dependencies: rusqlite, image, serde_json, tracing
// ============================================================================

//! ## Overview
//! The map database is an `SQLite` file following the engine's 0.22.0 schema.
//! The build side turns a capture session into an unprocessed database with
//! one node per retained frame. The parse side reads keyframes, feature
//! points and summary counts back out of a processed database.
//!
//! Security posture: processed databases are produced by an external binary
//! and treated as untrusted; the parse side opens them read-only and degrades
//! to empty results instead of failing on damaged files.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod builder;
pub mod depth;
pub mod parser;
pub mod schema;
pub mod session;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

use crate::core::CodecError;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use builder::BuildReport;
pub use builder::build_database;
pub use parser::Keyframe;
pub use parser::MapSummary;
pub use parser::WorldPoint;
pub use parser::count_words;
pub use parser::export_trajectory;
pub use parser::extract_point_cloud;
pub use parser::parse_database;
pub use parser::read_intrinsics;
pub use parser::read_node_pose;
pub use parser::read_parameters;
pub use schema::DATABASE_VERSION;
pub use session::CaptureFrame;
pub use session::CaptureSession;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Map database failures on the build side and on strict reads.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// `SQLite` reported an error.
    #[error("map database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Filesystem error.
    #[error("map database io error: {0}")]
    Io(#[from] std::io::Error),
    /// Image decode or encode failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// Record codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Capture session layout is invalid.
    #[error("invalid capture session: {0}")]
    Session(String),
    /// Database file does not exist.
    #[error("map database not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Requested node has no usable pose.
    #[error("node {0} has no pose")]
    MissingPose(i64),
    /// No calibration blob is stored in the database.
    #[error("no calibration data found in map database")]
    MissingCalibration,
}
