// crates/navslam-engine/src/localize.rs
// ============================================================================
// Module: Localization Pipeline
// Description: Query images against an existing map.
// Purpose: Stage a query session, run the console engine, and resolve a pose.
// Dependencies: navslam-core, image, serde, tokio, tracing
// ============================================================================

//! ## Overview
//! [`Localizer::localize`] writes up to five query images into a throwaway
//! session directory, runs the engine's console program against the stored
//! map under the short localization budget, picks the best reference node
//! from its output, and decodes that node's pose from the stored map. The
//! session directory is removed when the call returns, on every path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Cursor;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use image::ImageReader;
use navslam_core::Intrinsics;
use navslam_core::MatchKind;
use navslam_core::ParameterSet;
use navslam_core::database::read_intrinsics;
use navslam_core::database::read_node_pose;
use navslam_core::database::read_parameters;
use navslam_core::interpret_localization_output;
use navslam_core::scale_intrinsics;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::errors::EngineError;
use crate::invocation::EngineInvocation;
use crate::maps::MapDirectory;
use crate::supervisor::ProcessSupervisor;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Most query images accepted per request.
pub const MAX_QUERY_IMAGES: usize = 5;
/// Map parameters carried into the query so descriptors match.
const CARRIED_PARAMETERS: [&str; 2] = ["BRIEF/Bytes", "Kp/DetectorStrategy"];
/// Images subdirectory inside a query session.
const QUERY_IMAGES_DIR: &str = "images";
/// Image list consumed by the console program.
const IMAGE_LIST_FILE: &str = "images.txt";

/// Disambiguates query sessions started within the same second.
static QUERY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Localization result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Localization {
    /// Map the query ran against.
    pub map_id: String,
    /// Matched reference node.
    pub node_id: i64,
    /// Marker that produced the match.
    pub kind: MatchKind,
    /// Engine hypothesis score.
    pub hypothesis: f64,
    /// Bounded confidence in `[0.1, 0.9]`.
    pub confidence: f64,
    /// Reference node translation in the map frame.
    pub position: [f64; 3],
    /// Reference node orientation `[qx, qy, qz, qw]`.
    pub orientation: [f64; 4],
    /// Map intrinsics scaled to the query resolution.
    pub intrinsics: Intrinsics,
}

// ============================================================================
// SECTION: Localizer
// ============================================================================

/// Engine-backed localization against stored maps.
#[derive(Debug, Clone)]
pub struct Localizer {
    /// Shared engine supervisor.
    supervisor: Arc<ProcessSupervisor>,
    /// Stored maps.
    maps: MapDirectory,
    /// Parent directory of temporary query sessions.
    sessions_dir: PathBuf,
    /// Base parameters before query overrides.
    parameters: ParameterSet,
}

impl Localizer {
    /// Creates a localizer.
    #[must_use]
    pub const fn new(
        supervisor: Arc<ProcessSupervisor>,
        maps: MapDirectory,
        sessions_dir: PathBuf,
        parameters: ParameterSet,
    ) -> Self {
        Self {
            supervisor,
            maps,
            sessions_dir,
            parameters,
        }
    }

    /// Localizes encoded query `images` against map `map_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuery`] for zero, more than five, empty,
    /// or undecodable images, [`EngineError::MapNotFound`] for a missing map,
    /// [`EngineError::Supervisor`] when the engine fails or times out, and
    /// [`EngineError::Interpret`] when the output holds no match.
    pub async fn localize(&self, map_id: &str, images: &[Vec<u8>]) -> Result<Localization, EngineError> {
        validate_images(images)?;
        let map = self.maps.load_map(map_id).await?;
        let first = images.first().ok_or_else(|| EngineError::InvalidQuery("no images".to_string()))?;
        let (width, height) = image_dimensions(first)?;

        let intrinsics = {
            let map = map.clone();
            tokio::task::spawn_blocking(move || read_intrinsics(&map)).await??
        };
        let intrinsics = scale_intrinsics(&intrinsics, width, height)?;
        let parameters = self.query_parameters(&map).await?;

        let session = QuerySession::create(&self.sessions_dir, map_id, images).await?;
        let invocation = EngineInvocation::console(&map, &session.images_dir(), &parameters);
        let output = self.supervisor.run(&invocation, None).await?;
        drop(session);

        let found = interpret_localization_output(&output.stdout)?;
        let pose = {
            let map = map.clone();
            tokio::task::spawn_blocking(move || read_node_pose(&map, found.node_id)).await??
        };
        info!(
            map = map_id,
            node = found.node_id,
            hypothesis = found.hypothesis,
            elapsed_ms = u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX),
            "localization matched"
        );
        Ok(Localization {
            map_id: map_id.to_string(),
            node_id: found.node_id,
            kind: found.kind,
            hypothesis: found.hypothesis,
            confidence: found.confidence(),
            position: pose.position(),
            orientation: pose.orientation().to_array(),
            intrinsics,
        })
    }

    /// Builds query parameters from the base set and the map's own settings.
    async fn query_parameters(&self, map: &Path) -> Result<ParameterSet, EngineError> {
        let stored = {
            let map = map.to_path_buf();
            tokio::task::spawn_blocking(move || read_parameters(&map)).await??
        };
        let mut parameters = self.parameters.clone();
        for key in CARRIED_PARAMETERS {
            if let Some(value) = stored.get(key) {
                parameters.insert(key, value)?;
            }
        }
        parameters.insert("Mem/IncrementalMemory", "false")?;
        parameters.insert("Mem/InitWMWithAllNodes", "true")?;
        Ok(parameters)
    }
}

// ============================================================================
// SECTION: Query Session
// ============================================================================

/// Temporary query session directory, removed on drop.
#[derive(Debug)]
struct QuerySession {
    /// Session root.
    root: PathBuf,
}

impl QuerySession {
    /// Writes `images` and the image list into a fresh session directory.
    async fn create(parent: &Path, map_id: &str, images: &[Vec<u8>]) -> Result<Self, EngineError> {
        let stamp = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        let sequence = QUERY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let session = Self {
            root: parent.join(format!("reloc_{map_id}_{stamp}_{sequence}")),
        };
        let images_dir = session.images_dir();
        tokio::fs::create_dir_all(&images_dir).await?;

        let mut list = String::from("# timestamp filename\n");
        for (index, bytes) in images.iter().enumerate() {
            let name = format!("query_{index}.jpg");
            tokio::fs::write(images_dir.join(&name), bytes).await?;
            let _ = writeln!(list, "{index} {QUERY_IMAGES_DIR}/{name}");
        }
        tokio::fs::write(session.root.join(IMAGE_LIST_FILE), list).await?;
        debug!(session = %session.root.display(), images = images.len(), "query session staged");
        Ok(session)
    }

    /// Returns the images directory.
    fn images_dir(&self) -> PathBuf {
        self.root.join(QUERY_IMAGES_DIR)
    }
}

impl Drop for QuerySession {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.root)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(session = %self.root.display(), error = %err, "query session cleanup failed");
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Checks the query image count and that no image is empty.
fn validate_images(images: &[Vec<u8>]) -> Result<(), EngineError> {
    if images.is_empty() || images.len() > MAX_QUERY_IMAGES {
        return Err(EngineError::InvalidQuery(format!(
            "expected 1 to {MAX_QUERY_IMAGES} images, got {}",
            images.len()
        )));
    }
    if let Some(index) = images.iter().position(Vec::is_empty) {
        return Err(EngineError::InvalidQuery(format!("image {index} is empty")));
    }
    Ok(())
}

/// Reads the pixel dimensions of an encoded image.
fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), EngineError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| EngineError::InvalidQuery(format!("unreadable image: {err}")))?
        .into_dimensions()
        .map_err(|err| EngineError::InvalidQuery(format!("unreadable image: {err}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
