// crates/navslam-core/src/database/parser.rs
// ============================================================================
// Module: Map Database Parser
// Description: Read keyframes, feature points, and metadata from a map.
// Purpose: Turn processed engine databases into service-level results.
// Dependencies: rusqlite, serde, tracing
// ============================================================================

//! ## Overview
//! Two read styles live here. Summary reads ([`parse_database`] and
//! [`extract_point_cloud`]) never fail: a missing or damaged database yields
//! an empty result so map listings tolerate partial files. Targeted reads
//! ([`read_node_pose`], [`read_intrinsics`], [`read_parameters`],
//! [`count_words`]) return [`DatabaseError`] because their callers need a
//! definite answer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::ToSql;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::core::Intrinsics;
use crate::core::ParameterSet;
use crate::core::Pose;
use crate::core::decode_calibration;
use crate::core::decode_pose;
use crate::database::DatabaseError;
use crate::database::schema::LOOP_CLOSURE_LINK_TYPE;

// ============================================================================
// SECTION: Types
// ============================================================================

/// World-frame point `[x, y, z]`.
pub type WorldPoint = [f64; 3];

/// Posed node read from a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Node id.
    pub id: i64,
    /// Node stamp in seconds.
    pub timestamp: f64,
    /// Translation `[x, y, z]`.
    pub position: [f64; 3],
    /// Orientation `[qx, qy, qz, qw]`.
    pub orientation: [f64; 4],
}

/// Summary of a processed map database.
///
/// # Invariants
/// - `keyframe_count` counts every `Node` row, including rows whose pose is
///   absent or malformed and therefore missing from `keyframes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSummary {
    /// Total `Node` rows.
    pub keyframe_count: u64,
    /// Total `Feature` rows.
    pub map_point_count: u64,
    /// Nodes with decodable poses, ordered by id.
    pub keyframes: Vec<Keyframe>,
    /// `Link` rows of the accepted-loop type.
    pub loop_closure_count: u64,
}

// ============================================================================
// SECTION: Summary Reads
// ============================================================================

/// Parses a processed map database, degrading to an empty summary on failure.
#[must_use]
pub fn parse_database(path: &Path) -> MapSummary {
    match try_parse_database(path) {
        Ok(summary) => summary,
        Err(DatabaseError::NotFound(_)) => MapSummary::default(),
        Err(err) => {
            warn!(database = %path.display(), error = %err, "map database parse failed");
            MapSummary::default()
        }
    }
}

/// Strict variant of [`parse_database`].
fn try_parse_database(path: &Path) -> Result<MapSummary, DatabaseError> {
    let conn = open_read_only(path)?;
    let keyframe_count = count(&conn, "SELECT COUNT(*) FROM Node", &[])?;
    let loop_closure_count =
        count(&conn, "SELECT COUNT(*) FROM Link WHERE type = ?1", &[&LOOP_CLOSURE_LINK_TYPE])?;
    let map_point_count = count(&conn, "SELECT COUNT(*) FROM Feature", &[])?;

    let mut stmt = conn.prepare("SELECT id, pose, stamp FROM Node ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?, row.get::<_, Option<f64>>(2)?))
    })?;
    let mut keyframes = Vec::new();
    for row in rows {
        let (id, blob, stamp) = row?;
        let Some(pose) = blob.as_deref().and_then(|bytes| decode_pose(bytes).ok()) else {
            continue;
        };
        keyframes.push(Keyframe {
            id,
            timestamp: stamp.unwrap_or(0.0),
            position: pose.position(),
            orientation: pose.orientation().to_array(),
        });
    }
    Ok(MapSummary {
        keyframe_count,
        map_point_count,
        keyframes,
        loop_closure_count,
    })
}

/// Extracts feature points in world coordinates, at most `max_points`.
///
/// When more features exist than `max_points`, rows are decimated by even
/// stride in storage order (`index = i * rows / max_points`) before points on
/// unposed nodes are dropped. Failures degrade to an empty cloud.
#[must_use]
pub fn extract_point_cloud(path: &Path, max_points: usize) -> Vec<WorldPoint> {
    if max_points == 0 {
        return Vec::new();
    }
    match try_extract_point_cloud(path, max_points) {
        Ok(points) => points,
        Err(DatabaseError::NotFound(_)) => Vec::new(),
        Err(err) => {
            warn!(database = %path.display(), error = %err, "point cloud extraction failed");
            Vec::new()
        }
    }
}

/// Strict variant of [`extract_point_cloud`].
fn try_extract_point_cloud(path: &Path, max_points: usize) -> Result<Vec<WorldPoint>, DatabaseError> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare(
        "SELECT node_id, depth_x, depth_y, depth_z FROM Feature WHERE depth_x IS NOT NULL AND \
         depth_y IS NOT NULL AND depth_z IS NOT NULL ORDER BY rowid",
    )?;
    let features = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, [row.get(1)?, row.get(2)?, row.get(3)?])))?
        .collect::<Result<Vec<(i64, [f64; 3])>, _>>()?;
    if features.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT id, pose FROM Node")?;
    let mut poses: HashMap<i64, Pose> = HashMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)))?;
    for row in rows {
        let (id, blob) = row?;
        if let Some(pose) = blob.as_deref().and_then(|bytes| decode_pose(bytes).ok()) {
            poses.insert(id, pose);
        }
    }
    if poses.is_empty() {
        return Ok(Vec::new());
    }

    let total = features.len();
    let sampled: Vec<&(i64, [f64; 3])> = if total > max_points {
        (0..max_points).filter_map(|i| features.get(i * total / max_points)).collect()
    } else {
        features.iter().collect()
    };
    Ok(sampled
        .into_iter()
        .filter_map(|(node_id, local)| poses.get(node_id).map(|pose| pose.transform_point(*local)))
        .collect())
}

// ============================================================================
// SECTION: Targeted Reads
// ============================================================================

/// Reads and decodes the pose of node `node_id`.
///
/// # Errors
///
/// Returns [`DatabaseError::NotFound`] for a missing file,
/// [`DatabaseError::MissingPose`] when the node or its pose is absent and
/// [`DatabaseError::Codec`] when the pose record is malformed.
pub fn read_node_pose(path: &Path, node_id: i64) -> Result<Pose, DatabaseError> {
    let conn = open_read_only(path)?;
    let blob: Option<Vec<u8>> = conn
        .query_row("SELECT pose FROM Node WHERE id = ?1", [node_id], |row| row.get(0))
        .optional()?
        .flatten();
    let blob = blob.ok_or(DatabaseError::MissingPose(node_id))?;
    Ok(decode_pose(&blob)?)
}

/// Reads the first stored calibration record and returns its intrinsics.
///
/// # Errors
///
/// Returns [`DatabaseError::MissingCalibration`] when no node carries a
/// calibration and [`DatabaseError::Codec`] when it is malformed or invalid.
pub fn read_intrinsics(path: &Path) -> Result<Intrinsics, DatabaseError> {
    let conn = open_read_only(path)?;
    let blob: Option<Vec<u8>> = conn
        .query_row("SELECT calibration FROM Data WHERE calibration IS NOT NULL LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    match blob {
        Some(blob) if !blob.is_empty() => Ok(decode_calibration(&blob)?),
        _ => Err(DatabaseError::MissingCalibration),
    }
}

/// Reads the parameter set stored in the `Info` table.
///
/// Entries whose key or value contain a delimiter are dropped; a missing row
/// yields an empty set.
///
/// # Errors
///
/// Returns [`DatabaseError`] when the file is missing or unreadable.
pub fn read_parameters(path: &Path) -> Result<ParameterSet, DatabaseError> {
    let conn = open_read_only(path)?;
    let text: Option<String> = conn
        .query_row("SELECT parameters FROM Info LIMIT 1", [], |row| row.get(0))
        .optional()?
        .flatten();
    let mut parameters = ParameterSet::new();
    for segment in text.as_deref().unwrap_or_default().split(';') {
        let Some((key, value)) = segment.split_once(':') else {
            continue;
        };
        if let Err(err) = parameters.insert(key, value) {
            debug!(error = %err, "dropping stored parameter");
        }
    }
    Ok(parameters)
}

/// Counts visual words in the map vocabulary.
///
/// # Errors
///
/// Returns [`DatabaseError`] when the file is missing or unreadable.
pub fn count_words(path: &Path) -> Result<u64, DatabaseError> {
    let conn = open_read_only(path)?;
    count(&conn, "SELECT COUNT(*) FROM Word", &[])
}

/// Writes the map trajectory in TUM format (`timestamp tx ty tz qx qy qz qw`)
/// and returns the number of poses written.
///
/// # Errors
///
/// Returns [`DatabaseError::Io`] when the output cannot be written.
pub fn export_trajectory(path: &Path, output: &Path) -> Result<usize, DatabaseError> {
    let summary = parse_database(path);
    let mut text = String::from("# timestamp tx ty tz qx qy qz qw\n");
    for keyframe in &summary.keyframes {
        let [tx, ty, tz] = keyframe.position;
        let [qx, qy, qz, qw] = keyframe.orientation;
        let _ = writeln!(text, "{} {tx} {ty} {tz} {qx} {qy} {qz} {qw}", keyframe.timestamp);
    }
    fs::write(output, text)?;
    Ok(summary.keyframes.len())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens an existing database read-only.
fn open_read_only(path: &Path) -> Result<Connection, DatabaseError> {
    if !path.is_file() {
        return Err(DatabaseError::NotFound(path.to_path_buf()));
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Ok(Connection::open_with_flags(path, flags)?)
}

/// Runs a `COUNT(*)` query.
fn count(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<u64, DatabaseError> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}
