// crates/navslam-core/src/core/mod.rs
// ============================================================================
// Module: navslam Core Types
// Description: Record codecs, parameter sets, and job identifiers.
// Purpose: Group the leaf data types shared by every other navslam crate.
// Dependencies: nalgebra, serde, thiserror
// ============================================================================

//! ## Overview
//! Core types are plain values with explicit binary or text encodings. Codec
//! failures are structural and never recovered locally.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod calibration;
pub mod errors;
pub mod jobs;
pub mod params;
pub mod pose;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use calibration::CALIBRATION_RECORD_LEN;
pub use calibration::CalibrationRecord;
pub use calibration::Intrinsics;
pub use calibration::decode_calibration;
pub use calibration::encode_calibration;
pub use calibration::scale_intrinsics;
pub use errors::CodecError;
pub use errors::RecordKind;
pub use jobs::JobKey;
pub use jobs::JobRecord;
pub use jobs::JobStatus;
pub use params::DEFAULT_ENGINE_PARAMETERS;
pub use params::ParameterSet;
pub use pose::POSE_RECORD_LEN;
pub use pose::Pose;
pub use pose::Quaternion;
pub use pose::QuaternionBranch;
pub use pose::decode_pose;
pub use pose::encode_pose;
pub use pose::rotation_to_quaternion;
