// crates/navslam-core/src/lib.rs
// ============================================================================
// Module: navslam Core Library
// Description: Public API surface for the navslam core.
// Purpose: Expose record codecs, map database access, and store interfaces.
// Dependencies: crate::{core, database, interfaces, localization, runtime}
// ============================================================================

//! ## Overview
//! navslam core holds the deterministic parts of the map-building service: the
//! bit-exact pose, calibration, and parameter codecs, the map database builder
//! and parser, the localization output interpreter, and the durable job-status
//! contract consumed by the job queue. Nothing in this crate spawns processes
//! or owns an async runtime.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod database;
pub mod interfaces;
pub mod localization;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use database::BuildReport;
pub use database::CaptureFrame;
pub use database::CaptureSession;
pub use database::DatabaseError;
pub use database::Keyframe;
pub use database::MapSummary;
pub use database::build_database;
pub use database::extract_point_cloud;
pub use database::parse_database;
pub use interfaces::JobStatusStore;
pub use interfaces::StoreError;
pub use localization::InterpretError;
pub use localization::LoopMatch;
pub use localization::MatchKind;
pub use localization::confidence_from_hypothesis;
pub use localization::interpret_localization_output;
pub use runtime::InMemoryJobStore;
