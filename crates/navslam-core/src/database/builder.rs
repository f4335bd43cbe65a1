// crates/navslam-core/src/database/builder.rs
// ============================================================================
// Module: Map Database Builder
// Description: Writes an unprocessed map database from a capture session.
// Purpose: Give the engine's reprocess tool depth, calibration, and stamps.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! The builder replaces any existing output, creates the schema, then inserts
//! one `Node` + `Data` pair per retained frame inside a single transaction.
//! Node ids are sequential from 1 in frame order. Without monocular mode a
//! frame lacking depth evidence is skipped and does not consume an id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use rusqlite::Connection;
use rusqlite::params;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::core::Intrinsics;
use crate::core::ParameterSet;
use crate::core::Pose;
use crate::core::encode_calibration;
use crate::core::encode_pose;
use crate::database::DatabaseError;
use crate::database::depth::load_depth_png;
use crate::database::schema::DATABASE_VERSION;
use crate::database::schema::SCHEMA_SQL;
use crate::database::session::CaptureSession;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of a database build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Path of the created database.
    pub database_path: PathBuf,
    /// Frames stored as nodes.
    pub inserted: usize,
    /// Frames skipped for lack of depth.
    pub skipped: usize,
}

// ============================================================================
// SECTION: Build
// ============================================================================

/// Builds an unprocessed map database at `output`.
///
/// # Errors
///
/// Returns [`DatabaseError`] when the intrinsics are invalid, a frame image
/// cannot be read, or any `SQLite` statement fails. A failed build may leave a
/// partial file at `output`; the next build replaces it.
pub fn build_database(
    session: &CaptureSession,
    intrinsics: &Intrinsics,
    parameters: &ParameterSet,
    monocular: bool,
    output: &Path,
) -> Result<BuildReport, DatabaseError> {
    let calibration = encode_calibration(intrinsics)?;
    let identity = encode_pose(&Pose::identity());
    if output.exists() {
        fs::remove_file(output)?;
    }
    info!(
        frames = session.frames.len(),
        width = intrinsics.width,
        height = intrinsics.height,
        monocular,
        output = %output.display(),
        "building map database"
    );

    let mut conn = Connection::open(output)?;
    conn.execute_batch(SCHEMA_SQL)?;
    let tx = conn.transaction()?;
    tx.execute("INSERT INTO Admin (version) VALUES (?1)", params![DATABASE_VERSION])?;

    let mut node_id: i64 = 0;
    let mut skipped = 0_usize;
    for frame in &session.frames {
        let depth = if monocular {
            None
        } else {
            match load_depth_png(&frame.depth_path, intrinsics.width, intrinsics.height)? {
                Some(depth) => Some(depth),
                None => {
                    debug!(frame = %frame.stem, "skipping frame without depth");
                    skipped += 1;
                    continue;
                }
            }
        };
        let image = fs::read(&frame.image_path)?;
        node_id += 1;
        tx.execute(
            "INSERT INTO Node (id, map_id, weight, stamp, pose) VALUES (?1, 0, 0, ?2, ?3)",
            params![node_id, frame.stamp_seconds(), identity.as_slice()],
        )?;
        tx.execute(
            "INSERT INTO Data (id, image, depth, calibration) VALUES (?1, ?2, ?3, ?4)",
            params![node_id, image, depth, calibration.as_slice()],
        )?;
    }

    tx.execute(
        "INSERT INTO Info (STM_size, last_sign_added, process_mem_used, database_mem_used, \
         dictionary_size, parameters) VALUES (0, ?1, 0, 0, 0, ?2)",
        params![node_id, parameters.encode()],
    )?;
    tx.commit()?;

    let inserted = usize::try_from(node_id).unwrap_or(usize::MAX);
    info!(inserted, skipped, parameters = parameters.len(), "map database created");
    Ok(BuildReport {
        database_path: output.to_path_buf(),
        inserted,
        skipped,
    })
}
