// crates/navslam-core/tests/calibration_codec.rs
// ============================================================================
// Module: Calibration Codec Tests
// Description: Calibration record layout, validation, and scaling.
// Purpose: Lock the 164-byte camera record accepted by the engine.
// ============================================================================

//! Calibration record and intrinsics scaling tests.

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

use navslam_core::CALIBRATION_RECORD_LEN;
use navslam_core::CalibrationRecord;
use navslam_core::CodecError;
use navslam_core::Intrinsics;
use navslam_core::RecordKind;
use navslam_core::decode_calibration;
use navslam_core::encode_calibration;
use navslam_core::scale_intrinsics;

const fn phone_intrinsics() -> Intrinsics {
    Intrinsics {
        fx: 1450.5,
        fy: 1448.25,
        cx: 960.0,
        cy: 540.0,
        width: 1920,
        height: 1080,
    }
}

#[test]
fn encode_then_decode_is_exact() -> Result<(), String> {
    let intrinsics = phone_intrinsics();
    let bytes = encode_calibration(&intrinsics).map_err(|err| err.to_string())?;
    assert_eq!(bytes.len(), CALIBRATION_RECORD_LEN);
    assert_eq!(decode_calibration(&bytes).map_err(|err| err.to_string())?, intrinsics);
    Ok(())
}

#[test]
fn record_header_carries_version_sizes_and_optical_transform() -> Result<(), String> {
    let bytes = encode_calibration(&phone_intrinsics()).map_err(|err| err.to_string())?;
    let record = CalibrationRecord::from_bytes(&bytes).map_err(|err| err.to_string())?;
    assert_eq!(record.version, [0, 22, 0]);
    assert_eq!(record.model_type, 0);
    assert_eq!((record.width, record.height), (1920, 1080));
    assert_eq!(record.matrix_sizes, [9, 0, 0, 0]);
    assert_eq!(record.local_transform_size, 12);
    assert_eq!(record.k, [1450.5, 0.0, 960.0, 0.0, 1448.25, 540.0, 0.0, 0.0, 1.0]);
    assert_eq!(
        record.local_transform,
        [0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0]
    );
    // Width sits after the version triple and type.
    assert_eq!(&bytes[16 .. 20], &1920_i32.to_le_bytes());
    // K starts after eleven i32 header fields.
    assert_eq!(&bytes[44 .. 52], &1450.5_f64.to_le_bytes());
    Ok(())
}

#[test]
fn decode_rejects_wrong_lengths() {
    for len in [0_usize, 163, 165] {
        let err = decode_calibration(&vec![0_u8; len]).unwrap_err();
        assert_eq!(
            err,
            CodecError::MalformedRecord {
                record: RecordKind::Calibration,
                expected: CALIBRATION_RECORD_LEN,
                actual: len,
            }
        );
    }
}

#[test]
fn decode_rejects_non_positive_intrinsics() {
    let mut record =
        CalibrationRecord::from_intrinsics(&phone_intrinsics()).expect("valid intrinsics");
    record.k[2] = 0.0;
    let err = decode_calibration(&record.to_bytes()).unwrap_err();
    assert!(matches!(err, CodecError::InvalidIntrinsics(_)));

    let mut record =
        CalibrationRecord::from_intrinsics(&phone_intrinsics()).expect("valid intrinsics");
    record.height = -1;
    let err = decode_calibration(&record.to_bytes()).unwrap_err();
    assert!(matches!(err, CodecError::InvalidIntrinsics(_)));
}

#[test]
fn encode_rejects_non_positive_intrinsics() {
    let mut intrinsics = phone_intrinsics();
    intrinsics.fy = -3.0;
    assert!(matches!(encode_calibration(&intrinsics), Err(CodecError::InvalidIntrinsics(_))));
    let mut intrinsics = phone_intrinsics();
    intrinsics.width = 0;
    assert!(matches!(encode_calibration(&intrinsics), Err(CodecError::InvalidIntrinsics(_))));
}

#[test]
fn scaling_to_same_resolution_is_identity() -> Result<(), String> {
    let intrinsics = phone_intrinsics();
    let scaled = scale_intrinsics(&intrinsics, 1920, 1080).map_err(|err| err.to_string())?;
    assert_eq!(scaled, intrinsics);
    Ok(())
}

#[test]
fn scaling_is_linear_per_axis() -> Result<(), String> {
    let scaled = scale_intrinsics(&phone_intrinsics(), 960, 720).map_err(|err| err.to_string())?;
    assert!((scaled.fx - 725.25).abs() < 1e-9);
    assert!((scaled.cx - 480.0).abs() < 1e-9);
    assert!((scaled.fy - 1448.25 * (720.0 / 1080.0)).abs() < 1e-9);
    assert!((scaled.cy - 360.0).abs() < 1e-9);
    assert_eq!((scaled.width, scaled.height), (960, 720));
    Ok(())
}

#[test]
fn tenfold_width_change_is_extreme() {
    let err = scale_intrinsics(&phone_intrinsics(), 19_200, 1080).unwrap_err();
    assert!(matches!(err, CodecError::ExtremeScaling { scale_x, .. } if (scale_x - 10.0).abs() < 1e-9));
    let err = scale_intrinsics(&phone_intrinsics(), 1920, 100).unwrap_err();
    assert!(matches!(err, CodecError::ExtremeScaling { .. }));
}

#[test]
fn intrinsics_json_defaults_resolution() -> Result<(), String> {
    let parsed: Intrinsics =
        serde_json::from_str(r#"{"fx": 1.0, "fy": 2.0, "cx": 3.0, "cy": 4.0}"#)
            .map_err(|err| err.to_string())?;
    assert_eq!((parsed.width, parsed.height), (1920, 1080));
    Ok(())
}
