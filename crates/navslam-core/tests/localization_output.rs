// crates/navslam-core/tests/localization_output.rs
// ============================================================================
// Module: Localization Output Tests
// Description: Marker scanning, tie-breaks, and confidence mapping.
// Purpose: Keep match selection deterministic across engine log shapes.
// ============================================================================

//! Localization output interpreter tests.

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

use navslam_core::InterpretError;
use navslam_core::MatchKind;
use navslam_core::confidence_from_hypothesis;
use navslam_core::interpret_localization_output;

#[test]
fn accepted_loop_beats_higher_unaccepted_hypothesis() -> Result<(), InterpretError> {
    let stdout = "\
iteration(1) high(7) hyp(0.40) time=0.1s
iteration(2) loop(12) hyp(0.85) time=0.1s
iteration(3) high(7) hyp(0.92) time=0.1s
";
    let found = interpret_localization_output(stdout)?;
    assert_eq!(found.node_id, 12);
    assert_eq!(found.kind, MatchKind::AcceptedLoop);
    assert!((found.hypothesis - 0.85).abs() < 1e-12);
    assert!((found.confidence() - 0.9).abs() < 1e-12);
    Ok(())
}

#[test]
fn highest_loop_wins_and_earliest_wins_ties() -> Result<(), InterpretError> {
    let stdout = "\
iteration(1) loop(3) hyp(0.30)
iteration(2) loop(4) hyp(0.60)
iteration(3) loop(5) hyp(0.60)
iteration(4) loop(6) hyp(0.10)
";
    assert_eq!(interpret_localization_output(stdout)?.node_id, 4);
    Ok(())
}

#[test]
fn falls_back_to_best_hypothesis() -> Result<(), InterpretError> {
    let stdout = "\
Processing image 1
iteration(1) high(9) hyp(0.20)
iteration(2) high(11) hyp(0.35)
iteration(3) high(2) hyp(-0.5)
";
    let found = interpret_localization_output(stdout)?;
    assert_eq!(found.node_id, 11);
    assert_eq!(found.kind, MatchKind::BestHypothesis);
    assert!((found.confidence() - 0.675).abs() < 1e-12);
    Ok(())
}

#[test]
fn no_markers_is_no_match() {
    let stdout = "Loading database...\nRtabmap: 0 nodes\n";
    assert_eq!(interpret_localization_output(stdout), Err(InterpretError::NoMatch));
    assert_eq!(interpret_localization_output(""), Err(InterpretError::NoMatch));
}

#[test]
fn malformed_markers_are_ignored() {
    let stdout = "\
iteration(1) loop(abc) hyp(0.5)
iteration(2) loop(4)hyp(0.5)
iteration(3) loop(4) hyp(x)
iteration(4) preloop(8) hyp(0.5)
";
    assert_eq!(interpret_localization_output(stdout), Err(InterpretError::NoMatch));
}

#[test]
fn confidence_is_clamped() {
    assert!((confidence_from_hypothesis(5.0) - 0.9).abs() < 1e-12);
    assert!((confidence_from_hypothesis(-5.0) - 0.1).abs() < 1e-12);
    assert!((confidence_from_hypothesis(0.0) - 0.5).abs() < 1e-12);
}
