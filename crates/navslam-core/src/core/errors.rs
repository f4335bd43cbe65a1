// crates/navslam-core/src/core/errors.rs
// ============================================================================
// Module: Codec Errors
// Description: Error taxonomy for binary records and derived values.
// Purpose: Distinguish structural record violations from semantic ones.
// Dependencies: thiserror
// ============================================================================

//! Codec error types.

use std::fmt;

use thiserror::Error;

/// Binary record families stored in the map database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// 48-byte rigid transform.
    Pose,
    /// 164-byte camera model.
    Calibration,
}

impl RecordKind {
    /// Returns a stable label for the record kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pose => "pose",
            Self::Calibration => "calibration",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codec failures for records, intrinsics, and parameter sets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// Record length or shape does not match the fixed layout.
    #[error("malformed {record} record: expected {expected} bytes, found {actual}")]
    MalformedRecord {
        /// Record family being decoded.
        record: RecordKind,
        /// Required byte length.
        expected: usize,
        /// Observed byte length.
        actual: usize,
    },
    /// Intrinsics are non-positive or out of range.
    #[error("invalid intrinsics: {0}")]
    InvalidIntrinsics(String),
    /// Resolution change implies an implausible scale factor.
    #[error(
        "extreme intrinsics scaling: scale_x={scale_x:.3}, scale_y={scale_y:.3} (allowed 0.2 to 5.0)"
    )]
    ExtremeScaling {
        /// Horizontal scale factor.
        scale_x: f64,
        /// Vertical scale factor.
        scale_y: f64,
    },
    /// Parameter key or value contains a delimiter.
    #[error("invalid parameter entry: {0}")]
    InvalidParameter(String),
}
