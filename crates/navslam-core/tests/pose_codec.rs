// crates/navslam-core/tests/pose_codec.rs
// ============================================================================
// Module: Pose Codec Tests
// Description: Pose record layout, round trips, and quaternion branches.
// Purpose: Lock the 48-byte record and rotation conversion behavior.
// ============================================================================

//! Pose record and quaternion conversion tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use nalgebra::Matrix3;
use nalgebra::Rotation3;
use nalgebra::Unit;
use nalgebra::Vector3;
use navslam_core::CodecError;
use navslam_core::POSE_RECORD_LEN;
use navslam_core::Pose;
use navslam_core::QuaternionBranch;
use navslam_core::RecordKind;
use navslam_core::decode_pose;
use navslam_core::encode_pose;
use navslam_core::rotation_to_quaternion;
use proptest::prelude::*;

fn rotation(axis: Vector3<f64>, angle: f64) -> Matrix3<f32> {
    Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle).into_inner().cast::<f32>()
}

fn assert_reconstructs(matrix: &Matrix3<f32>) {
    let rebuilt = rotation_to_quaternion(matrix).to_rotation_matrix();
    let expected = matrix.cast::<f64>();
    for row in 0 .. 3 {
        for col in 0 .. 3 {
            let diff = (rebuilt[(row, col)] - expected[(row, col)]).abs();
            assert!(diff < 1e-5, "entry ({row},{col}) differs by {diff}");
        }
    }
}

#[test]
fn decode_rejects_wrong_lengths() {
    for len in [0_usize, 47, 49, 96] {
        let err = decode_pose(&vec![0_u8; len]).unwrap_err();
        assert_eq!(
            err,
            CodecError::MalformedRecord {
                record: RecordKind::Pose,
                expected: POSE_RECORD_LEN,
                actual: len,
            }
        );
    }
}

#[test]
fn identity_decodes_to_identity() -> Result<(), String> {
    let pose = decode_pose(&encode_pose(&Pose::identity())).map_err(|err| err.to_string())?;
    assert_eq!(pose, Pose::identity());
    assert_eq!(pose.orientation().to_array(), [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(pose.position(), [0.0, 0.0, 0.0]);
    Ok(())
}

#[test]
fn record_is_row_major_rotation_then_translation() -> Result<(), String> {
    let mut bytes = [0_u8; POSE_RECORD_LEN];
    let values: [f32; 12] = [1.0, 2.0, 3.0, 10.0, 4.0, 5.0, 6.0, 20.0, 7.0, 8.0, 9.0, 30.0];
    for (chunk, value) in bytes.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    let pose = decode_pose(&bytes).map_err(|err| err.to_string())?;
    assert_eq!(pose.rotation, Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0));
    assert_eq!(pose.translation, Vector3::new(10.0, 20.0, 30.0));
    assert_eq!(encode_pose(&pose), bytes);
    Ok(())
}

#[test]
fn every_branch_reconstructs_its_rotation() {
    let angle = 170_f64.to_radians();
    let cases = [
        (rotation(Vector3::new(0.0, 0.0, 1.0), 0.5), QuaternionBranch::Trace),
        (rotation(Vector3::new(1.0, 0.0, 0.0), angle), QuaternionBranch::XDominant),
        (rotation(Vector3::new(0.0, 1.0, 0.0), angle), QuaternionBranch::YDominant),
        (rotation(Vector3::new(0.0, 0.0, 1.0), angle), QuaternionBranch::ZDominant),
    ];
    for (matrix, branch) in cases {
        assert_eq!(QuaternionBranch::select(&matrix.cast::<f64>()), branch);
        assert_reconstructs(&matrix);
    }
}

#[test]
fn transform_point_applies_rotation_then_translation() {
    let quarter_turn = rotation(Vector3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2);
    let pose = Pose::new(quarter_turn, Vector3::new(1.0, 2.0, 3.0));
    let world = pose.transform_point([1.0, 0.0, 0.0]);
    assert!((world[0] - 1.0).abs() < 1e-6);
    assert!((world[1] - 3.0).abs() < 1e-6);
    assert!((world[2] - 3.0).abs() < 1e-6);
}

proptest! {
    #[test]
    fn pose_round_trips_exactly(
        roll in -3.1_f64 .. 3.1,
        pitch in -1.5_f64 .. 1.5,
        yaw in -3.1_f64 .. 3.1,
        tx in -100.0_f32 .. 100.0,
        ty in -100.0_f32 .. 100.0,
        tz in -100.0_f32 .. 100.0,
    ) {
        let matrix = Rotation3::from_euler_angles(roll, pitch, yaw).into_inner().cast::<f32>();
        let pose = Pose::new(matrix, Vector3::new(tx, ty, tz));
        let decoded = decode_pose(&encode_pose(&pose)).unwrap();
        prop_assert_eq!(decoded, pose);
    }

    #[test]
    fn quaternion_reconstructs_arbitrary_rotations(
        roll in -3.1_f64 .. 3.1,
        pitch in -1.5_f64 .. 1.5,
        yaw in -3.1_f64 .. 3.1,
    ) {
        let matrix = Rotation3::from_euler_angles(roll, pitch, yaw).into_inner().cast::<f32>();
        assert_reconstructs(&matrix);
    }
}
