// crates/navslam-core/src/localization.rs
// ============================================================================
// Module: Localization Output Interpreter
// Description: Extracts the matched reference node from engine console output.
// Purpose: Turn streamed localization text into a structured match decision.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The localization run prints one line per processed query image. Two
//! marker shapes matter: an accepted loop closure `loop(<id>) hyp(<value>)`
//! and a best unaccepted hypothesis `high(<id>) hyp(<value>)`. Accepted
//! loops always win over hypotheses; within each kind the highest value wins
//! and the earliest line wins ties.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lowest confidence ever reported.
const MIN_CONFIDENCE: f64 = 0.1;
/// Highest confidence ever reported.
const MAX_CONFIDENCE: f64 = 0.9;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Which marker produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// `loop(<id>) hyp(<value>)`.
    AcceptedLoop,
    /// `high(<id>) hyp(<value>)`.
    BestHypothesis,
}

impl MatchKind {
    /// Marker keyword preceding the node id.
    const fn keyword(self) -> &'static str {
        match self {
            Self::AcceptedLoop => "loop(",
            Self::BestHypothesis => "high(",
        }
    }
}

/// Reference node selected from localization output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoopMatch {
    /// Matched map node id.
    pub node_id: i64,
    /// Engine hypothesis score, roughly in `[-1, 1]`.
    pub hypothesis: f64,
    /// Marker that produced the match.
    pub kind: MatchKind,
}

impl LoopMatch {
    /// Returns the bounded confidence for this match.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        confidence_from_hypothesis(self.hypothesis)
    }
}

/// Output interpretation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretError {
    /// Neither marker appeared in the output.
    #[error("no loop closure or hypothesis found in localization output")]
    NoMatch,
}

// ============================================================================
// SECTION: Interpretation
// ============================================================================

/// Selects the best reference node from localization stdout.
///
/// # Errors
///
/// Returns [`InterpretError::NoMatch`] when no marker is present.
pub fn interpret_localization_output(stdout: &str) -> Result<LoopMatch, InterpretError> {
    let mut best_loop: Option<LoopMatch> = None;
    let mut best_high: Option<LoopMatch> = None;
    for line in stdout.lines() {
        if let Some(found) = find_marker(line, MatchKind::AcceptedLoop) {
            keep_best(&mut best_loop, found);
        } else if let Some(found) = find_marker(line, MatchKind::BestHypothesis) {
            keep_best(&mut best_high, found);
        }
    }
    best_loop.or(best_high).ok_or(InterpretError::NoMatch)
}

/// Maps a hypothesis score into `[0.1, 0.9]`.
#[must_use]
pub fn confidence_from_hypothesis(hypothesis: f64) -> f64 {
    ((hypothesis + 1.0) / 2.0).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Replaces `slot` only on a strictly greater hypothesis.
fn keep_best(slot: &mut Option<LoopMatch>, candidate: LoopMatch) {
    if slot.is_none_or(|current| candidate.hypothesis > current.hypothesis) {
        *slot = Some(candidate);
    }
}

/// Finds the first well-formed `<kind>(<id>) hyp(<value>)` marker in `line`.
fn find_marker(line: &str, kind: MatchKind) -> Option<LoopMatch> {
    let keyword = kind.keyword();
    let mut search_from = 0;
    while let Some(offset) = line.get(search_from..)?.find(keyword) {
        let start = search_from + offset;
        search_from = start + keyword.len();
        let at_boundary =
            line[..start].chars().next_back().is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_');
        if !at_boundary {
            continue;
        }
        if let Some((node_id, hypothesis)) = parse_marker_body(&line[search_from..]) {
            return Some(LoopMatch {
                node_id,
                hypothesis,
                kind,
            });
        }
    }
    None
}

/// Parses `<id>)<ws>hyp(<value>)` following a marker keyword.
fn parse_marker_body(rest: &str) -> Option<(i64, f64)> {
    let (id_text, rest) = rest.split_once(')')?;
    if id_text.is_empty() || !id_text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        return None;
    }
    let value_text = trimmed.strip_prefix("hyp(")?.split_once(')')?.0;
    let well_formed =
        !value_text.is_empty() && value_text.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'.');
    if !well_formed {
        return None;
    }
    Some((id_text.parse().ok()?, value_text.parse().ok()?))
}
