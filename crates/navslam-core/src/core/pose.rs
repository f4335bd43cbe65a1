// crates/navslam-core/src/core/pose.rs
// ============================================================================
// Module: Pose Record Codec
// Description: Rigid-transform records and rotation/quaternion conversion.
// Purpose: Encode and decode the 48-byte pose blobs stored on map nodes.
// Dependencies: nalgebra, serde
// ============================================================================

//! ## Overview
//! A pose record is twelve little-endian `f32` values holding the row-major
//! 3x4 transform `[R | t]`. Quaternions are derived in `f64` from the stored
//! `f32` values so the output matches the engine's own serialization
//! bit-for-bit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nalgebra::Matrix3;
use nalgebra::Vector3;
use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::CodecError;
use crate::core::errors::RecordKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Encoded pose record length in bytes.
pub const POSE_RECORD_LEN: usize = 48;
/// Number of `f32` values in a pose record.
const POSE_VALUE_COUNT: usize = 12;

// ============================================================================
// SECTION: Pose
// ============================================================================

/// Rigid transform `[R | t]` as stored on a map node.
///
/// # Invariants
/// - `rotation` is expected to be approximately orthonormal; the codec does
///   not re-normalize it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// 3x3 rotation block.
    pub rotation: Matrix3<f32>,
    /// 3x1 translation column.
    pub translation: Vector3<f32>,
}

impl Pose {
    /// Creates a pose from its rotation and translation.
    #[must_use]
    pub const fn new(rotation: Matrix3<f32>, translation: Vector3<f32>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Returns the identity transform (`R = I`, `t = 0`).
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Returns the translation as `f64` components.
    #[must_use]
    pub fn position(&self) -> [f64; 3] {
        [
            f64::from(self.translation.x),
            f64::from(self.translation.y),
            f64::from(self.translation.z),
        ]
    }

    /// Returns the orientation quaternion.
    #[must_use]
    pub fn orientation(&self) -> Quaternion {
        rotation_to_quaternion(&self.rotation)
    }

    /// Maps a point from the node's local frame into the world frame
    /// (`R * p + t`), evaluated in `f64`.
    #[must_use]
    pub fn transform_point(&self, local: [f64; 3]) -> [f64; 3] {
        let rotation = self.rotation.cast::<f64>();
        let translation = self.translation.cast::<f64>();
        let world = rotation * Vector3::from(local) + translation;
        [world.x, world.y, world.z]
    }
}

// ============================================================================
// SECTION: Quaternion
// ============================================================================

/// Unit quaternion in `(x, y, z, w)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
    /// Scalar component.
    pub w: f64,
}

impl Quaternion {
    /// Returns `[x, y, z, w]`.
    #[must_use]
    pub const fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Reconstructs the rotation matrix with the standard unit-quaternion
    /// formula.
    #[must_use]
    pub fn to_rotation_matrix(self) -> Matrix3<f64> {
        let Self {
            x,
            y,
            z,
            w,
        } = self;
        Matrix3::new(
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - z * w),
            2.0 * (x * z + y * w),
            2.0 * (x * y + z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - x * w),
            2.0 * (x * z - y * w),
            2.0 * (y * z + x * w),
            1.0 - 2.0 * (x * x + y * y),
        )
    }
}

/// Numerically stable branch used to extract a quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuaternionBranch {
    /// Positive trace.
    Trace,
    /// `r11` dominates the diagonal.
    XDominant,
    /// `r22` dominates the diagonal.
    YDominant,
    /// `r33` dominates the diagonal.
    ZDominant,
}

impl QuaternionBranch {
    /// Selects the branch from the trace and diagonal of `m`.
    #[must_use]
    pub fn select(m: &Matrix3<f64>) -> Self {
        let (r11, r22, r33) = (m[(0, 0)], m[(1, 1)], m[(2, 2)]);
        let trace = r11 + r22 + r33;
        match (trace > 0.0, r11 > r22 && r11 > r33, r22 > r33) {
            (true, _, _) => Self::Trace,
            (false, true, _) => Self::XDominant,
            (false, false, true) => Self::YDominant,
            (false, false, false) => Self::ZDominant,
        }
    }
}

/// Converts a rotation matrix into a quaternion.
///
/// The computation runs in `f64` on the widened `f32` entries; operand order
/// inside each expression is fixed so results are reproducible.
#[must_use]
pub fn rotation_to_quaternion(rotation: &Matrix3<f32>) -> Quaternion {
    let m = rotation.cast::<f64>();
    let (r11, r12, r13) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (r21, r22, r23) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (r31, r32, r33) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);
    match QuaternionBranch::select(&m) {
        QuaternionBranch::Trace => {
            let s = 0.5 / (r11 + r22 + r33 + 1.0).sqrt();
            Quaternion {
                x: (r32 - r23) * s,
                y: (r13 - r31) * s,
                z: (r21 - r12) * s,
                w: 0.25 / s,
            }
        }
        QuaternionBranch::XDominant => {
            let s = 2.0 * (1.0 + r11 - r22 - r33).sqrt();
            Quaternion {
                x: 0.25 * s,
                y: (r12 + r21) / s,
                z: (r13 + r31) / s,
                w: (r32 - r23) / s,
            }
        }
        QuaternionBranch::YDominant => {
            let s = 2.0 * (1.0 + r22 - r11 - r33).sqrt();
            Quaternion {
                x: (r12 + r21) / s,
                y: 0.25 * s,
                z: (r23 + r32) / s,
                w: (r13 - r31) / s,
            }
        }
        QuaternionBranch::ZDominant => {
            let s = 2.0 * (1.0 + r33 - r11 - r22).sqrt();
            Quaternion {
                x: (r13 + r31) / s,
                y: (r23 + r32) / s,
                z: 0.25 * s,
                w: (r21 - r12) / s,
            }
        }
    }
}

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Encodes a pose into its 48-byte little-endian record.
#[must_use]
pub fn encode_pose(pose: &Pose) -> [u8; POSE_RECORD_LEN] {
    let mut values = [0.0_f32; POSE_VALUE_COUNT];
    for row in 0..3 {
        for col in 0..3 {
            values[row * 4 + col] = pose.rotation[(row, col)];
        }
        values[row * 4 + 3] = pose.translation[row];
    }
    let mut out = [0_u8; POSE_RECORD_LEN];
    for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decodes a 48-byte pose record.
///
/// # Errors
///
/// Returns [`CodecError::MalformedRecord`] when `bytes` is not exactly
/// [`POSE_RECORD_LEN`] bytes long.
pub fn decode_pose(bytes: &[u8]) -> Result<Pose, CodecError> {
    if bytes.len() != POSE_RECORD_LEN {
        return Err(CodecError::MalformedRecord {
            record: RecordKind::Pose,
            expected: POSE_RECORD_LEN,
            actual: bytes.len(),
        });
    }
    let mut v = [0.0_f32; POSE_VALUE_COUNT];
    for (value, chunk) in v.iter_mut().zip(bytes.chunks_exact(4)) {
        let mut raw = [0_u8; 4];
        raw.copy_from_slice(chunk);
        *value = f32::from_le_bytes(raw);
    }
    Ok(Pose::new(
        Matrix3::new(v[0], v[1], v[2], v[4], v[5], v[6], v[8], v[9], v[10]),
        Vector3::new(v[3], v[7], v[11]),
    ))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_record_layout() {
        let bytes = encode_pose(&Pose::identity());
        let one = 1.0_f32.to_le_bytes();
        assert_eq!(&bytes[0..4], &one);
        assert_eq!(&bytes[20..24], &one);
        assert_eq!(&bytes[40..44], &one);
        assert!(bytes[12..16].iter().all(|b| *b == 0));
    }

    #[test]
    fn branch_selection_covers_diagonal_cases() {
        let cases = [
            (Matrix3::identity(), QuaternionBranch::Trace),
            (Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0)), QuaternionBranch::XDominant),
            (Matrix3::from_diagonal(&Vector3::new(-1.0, 1.0, -1.0)), QuaternionBranch::YDominant),
            (Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0)), QuaternionBranch::ZDominant),
        ];
        for (matrix, expected) in cases {
            assert_eq!(QuaternionBranch::select(&matrix), expected);
        }
    }
}
