// crates/navslam-engine/src/maps.rs
// ============================================================================
// Module: Map Directory
// Description: Persisted map databases, point-cloud companions, and metadata.
// Purpose: Name, store, list, and describe maps by id.
// Dependencies: navslam-core, async-trait, serde, serde_json, time, tokio
// ============================================================================

//! ## Overview
//! A [`MapDirectory`] owns one flat directory of maps. Map `id` lives at
//! `<id>.db` with an optional `<id>.ply` point cloud and an optional
//! `<id>_meta.json` descriptor. Ids are restricted to letters, digits, `-`,
//! `_` and `.` (not leading) so they can never escape the directory.
//!
//! Listing tolerates partially written or legacy files: a database that cannot
//! be parsed appears with an empty summary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use navslam_core::JobKey;
use navslam_core::MapSummary;
use navslam_core::parse_database;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::errors::EngineError;
use crate::pipeline::BuildOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Map database extension.
const MAP_EXTENSION: &str = "db";
/// Point-cloud companion extension.
const CLOUD_EXTENSION: &str = "ply";
/// Metadata descriptor suffix.
const METADATA_SUFFIX: &str = "_meta.json";
/// Engine label written into metadata.
const ENGINE_LABEL: &str = "rtabmap";
/// Maximum map id length.
const MAX_MAP_ID_LEN: usize = 255;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One listed map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapListing {
    /// Map id.
    pub id: String,
    /// Database size in bytes.
    pub size_bytes: u64,
    /// Last modification time (RFC 3339), when available.
    pub modified: Option<String>,
    /// Whether a point-cloud companion exists.
    pub has_cloud: bool,
    /// Parsed summary; empty for unreadable databases.
    pub summary: MapSummary,
}

/// Keyframe entry in a metadata descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataKeyframe {
    /// Node id.
    pub id: i64,
    /// Position in the viewer frame (`[-y, -z, x]` of the map frame).
    pub position: [f64; 3],
    /// Orientation `[qx, qy, qz, qw]` in the map frame.
    pub orientation: [f64; 4],
}

/// Metadata descriptor written next to a map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMetadata {
    /// Map id.
    pub map_id: String,
    /// Display name.
    pub name: String,
    /// Database modification time (RFC 3339).
    pub created_at: Option<String>,
    /// Total nodes in the map.
    pub keyframe_count: u64,
    /// Posed keyframes.
    pub keyframes: Vec<MetadataKeyframe>,
    /// Engine that produced the map.
    pub engine: &'static str,
}

impl MapMetadata {
    /// Builds the descriptor from a parsed summary.
    #[must_use]
    pub fn from_summary(map_id: &str, summary: &MapSummary, created_at: Option<String>) -> Self {
        let keyframes = summary
            .keyframes
            .iter()
            .map(|keyframe| MetadataKeyframe {
                id: keyframe.id,
                position: viewer_position(keyframe.position),
                orientation: keyframe.orientation,
            })
            .collect();
        Self {
            map_id: map_id.to_string(),
            name: map_id.to_string(),
            created_at,
            keyframe_count: summary.keyframe_count,
            keyframes,
            engine: ENGINE_LABEL,
        }
    }
}

/// Destination for completed builds.
#[async_trait]
pub trait MapArchive: Send + Sync {
    /// Persists the artifacts of a completed build under its job key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the artifacts cannot be stored.
    async fn persist(&self, key: &JobKey, outcome: &BuildOutcome) -> Result<(), EngineError>;
}

// ============================================================================
// SECTION: Map Directory
// ============================================================================

/// Flat directory of persisted maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDirectory {
    /// Directory root.
    root: PathBuf,
}

impl MapDirectory {
    /// Creates a map directory rooted at `root`; nothing is created yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// Returns the directory root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks that `id` is usable as a file stem.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMapId`] for empty, overlong, hidden, or
    /// path-bearing ids.
    pub fn validate_map_id(id: &str) -> Result<(), EngineError> {
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
        if id.is_empty()
            || id.len() > MAX_MAP_ID_LEN
            || id.starts_with('.')
            || !id.chars().all(allowed)
        {
            return Err(EngineError::InvalidMapId(id.to_string()));
        }
        Ok(())
    }

    /// Returns the database path of map `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMapId`] when `id` is not a valid map id.
    pub fn map_path(&self, id: &str) -> Result<PathBuf, EngineError> {
        Self::validate_map_id(id)?;
        Ok(self.root.join(format!("{id}.{MAP_EXTENSION}")))
    }

    /// Returns the point-cloud companion path of map `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMapId`] when `id` is not a valid map id.
    pub fn cloud_path(&self, id: &str) -> Result<PathBuf, EngineError> {
        Self::validate_map_id(id)?;
        Ok(self.root.join(format!("{id}.{CLOUD_EXTENSION}")))
    }

    /// Returns the metadata descriptor path of map `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMapId`] when `id` is not a valid map id.
    pub fn metadata_path(&self, id: &str) -> Result<PathBuf, EngineError> {
        Self::validate_map_id(id)?;
        Ok(self.root.join(format!("{id}{METADATA_SUFFIX}")))
    }

    /// Copies a build's database (and cloud, when present) into the directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for an invalid id or a failed copy.
    pub async fn save_map(&self, id: &str, outcome: &BuildOutcome) -> Result<PathBuf, EngineError> {
        let target = self.map_path(id)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::copy(&outcome.output_database, &target).await?;
        if let Some(cloud) = &outcome.cloud {
            tokio::fs::copy(cloud, self.cloud_path(id)?).await?;
        }
        info!(map = id, path = %target.display(), "map saved");
        Ok(target)
    }

    /// Returns the database path of an existing map.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MapNotFound`] when no database exists for `id`.
    pub async fn load_map(&self, id: &str) -> Result<PathBuf, EngineError> {
        let path = self.map_path(id)?;
        if tokio::fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(EngineError::MapNotFound(id.to_string()))
        }
    }

    /// Lists every map ordered by id.
    ///
    /// A missing directory lists as empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] when the directory cannot be read.
    pub async fn list_maps(&self) -> Result<Vec<MapListing>, EngineError> {
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MAP_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if Self::validate_map_id(id).is_err() {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            candidates.push((id.to_string(), path.clone(), metadata.len(), metadata.modified().ok()));
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut listings = Vec::with_capacity(candidates.len());
        for (id, path, size_bytes, modified) in candidates {
            let has_cloud = tokio::fs::try_exists(self.cloud_path(&id)?).await?;
            let summary = tokio::task::spawn_blocking(move || parse_database(&path)).await?;
            listings.push(MapListing {
                id,
                size_bytes,
                modified: modified.and_then(format_time),
                has_cloud,
                summary,
            });
        }
        Ok(listings)
    }

    /// Writes `<id>_meta.json` for an existing map and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MapNotFound`] for a missing map and
    /// [`EngineError::Io`] when the descriptor cannot be written.
    pub async fn write_metadata(&self, id: &str) -> Result<PathBuf, EngineError> {
        let database = self.load_map(id).await?;
        let created_at =
            tokio::fs::metadata(&database).await?.modified().ok().and_then(format_time);
        let summary = tokio::task::spawn_blocking(move || parse_database(&database)).await?;
        let metadata = MapMetadata::from_summary(id, &summary, created_at);
        let body = serde_json::to_vec_pretty(&metadata)
            .map_err(|err| EngineError::Io(format!("metadata encode failed: {err}")))?;
        let path = self.metadata_path(id)?;
        tokio::fs::write(&path, body).await?;
        info!(map = id, keyframes = metadata.keyframes.len(), "map metadata written");
        Ok(path)
    }
}

#[async_trait]
impl MapArchive for MapDirectory {
    async fn persist(&self, key: &JobKey, outcome: &BuildOutcome) -> Result<(), EngineError> {
        self.save_map(key.as_str(), outcome).await?;
        self.write_metadata(key.as_str()).await?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a map-frame position (x forward, y left, z up) into the viewer
/// frame (x right, y up, z backward).
const fn viewer_position(position: [f64; 3]) -> [f64; 3] {
    [-position[1], -position[2], position[0]]
}

/// Formats a filesystem time as RFC 3339.
fn format_time(time: SystemTime) -> Option<String> {
    OffsetDateTime::from(time).format(&Rfc3339).ok()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
