// crates/navslam-core/src/database/session.rs
// ============================================================================
// Module: Capture Session Loader
// Description: Reads the on-disk layout of an uploaded capture session.
// Purpose: Produce the ordered frame list fed to the database builder.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! A capture session directory holds `images/` (JPEG or PNG frames),
//! `depth/<stem>.png` (optional 16-bit depth), `chunks/*.json` (per-frame
//! metadata arrays) and an optional `metadata.json`. Frames are ordered by
//! file name so node ids are deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::core::Intrinsics;
use crate::database::DatabaseError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Frame image directory.
pub const IMAGES_DIR: &str = "images";
/// Depth image directory.
pub const DEPTH_DIR: &str = "depth";
/// Per-frame metadata directory.
pub const CHUNKS_DIR: &str = "chunks";
/// Session-level metadata file.
pub const METADATA_FILE: &str = "metadata.json";
/// Accepted image extensions (case-insensitive).
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// One captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFrame {
    /// Image file stem, shared with the depth file.
    pub stem: String,
    /// Path of the RGB image.
    pub image_path: PathBuf,
    /// Candidate depth image path; may not exist.
    pub depth_path: PathBuf,
    /// Capture time in milliseconds; `0.0` when unknown.
    pub timestamp_ms: f64,
}

impl CaptureFrame {
    /// Returns the node stamp in seconds (`0.0` when unknown).
    #[must_use]
    pub fn stamp_seconds(&self) -> f64 {
        if self.timestamp_ms > 0.0 { self.timestamp_ms / 1000.0 } else { 0.0 }
    }
}

/// Loaded capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    /// Session root directory.
    pub root: PathBuf,
    /// Frames in file-name order.
    pub frames: Vec<CaptureFrame>,
    /// Camera intrinsics recorded with the session, if any.
    pub intrinsics: Option<Intrinsics>,
}

/// Frame object inside a chunk file.
#[derive(Debug, Deserialize)]
struct ChunkFrame {
    /// Image path as uploaded; only its stem is used.
    #[serde(default)]
    image_path: String,
    /// Capture time in milliseconds.
    #[serde(default)]
    timestamp: f64,
    /// Intrinsics reported with the frame.
    #[serde(default)]
    camera_intrinsics: Option<Intrinsics>,
}

/// Session metadata document.
#[derive(Debug, Deserialize)]
struct SessionMetadata {
    /// Session-wide intrinsics.
    #[serde(default)]
    camera_intrinsics: Option<Intrinsics>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl CaptureSession {
    /// Loads a session directory.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Session`] when `images/` is missing and
    /// [`DatabaseError::Io`] when a directory cannot be listed.
    pub fn load(root: &Path) -> Result<Self, DatabaseError> {
        let images_dir = root.join(IMAGES_DIR);
        if !images_dir.is_dir() {
            return Err(DatabaseError::Session(format!(
                "missing images directory: {}",
                images_dir.display()
            )));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&images_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_image_name(&name) {
                names.push(name);
            }
        }
        names.sort();

        let (stamps, chunk_intrinsics) = load_chunks(&root.join(CHUNKS_DIR));
        let depth_dir = root.join(DEPTH_DIR);
        let frames = names
            .into_iter()
            .map(|name| {
                let stem = file_stem(&name);
                CaptureFrame {
                    image_path: images_dir.join(&name),
                    depth_path: depth_dir.join(format!("{stem}.png")),
                    timestamp_ms: stamps.get(&stem).copied().unwrap_or(0.0),
                    stem,
                }
            })
            .collect();
        let intrinsics = load_metadata_intrinsics(&root.join(METADATA_FILE)).or(chunk_intrinsics);
        Ok(Self {
            root: root.to_path_buf(),
            frames,
            intrinsics,
        })
    }
}

/// Returns true for accepted image extensions.
fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Returns the stem of a file name or path string.
fn file_stem(name: &str) -> String {
    Path::new(name).file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Reads chunk files in name order. Unreadable chunks are skipped; later
/// chunks override earlier timestamps for the same stem.
fn load_chunks(chunks_dir: &Path) -> (BTreeMap<String, f64>, Option<Intrinsics>) {
    let mut stamps = BTreeMap::new();
    let mut intrinsics = None;
    let Ok(entries) = fs::read_dir(chunks_dir) else {
        return (stamps, intrinsics);
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    for path in paths {
        let frames = fs::read(&path)
            .map_err(|err| err.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<Vec<ChunkFrame>>(&bytes).map_err(|err| err.to_string())
            });
        let frames = match frames {
            Ok(frames) => frames,
            Err(err) => {
                warn!(chunk = %path.display(), error = %err, "skipping unreadable chunk file");
                continue;
            }
        };
        for frame in frames {
            if intrinsics.is_none() {
                intrinsics = frame.camera_intrinsics;
            }
            let stem = file_stem(&frame.image_path);
            if !stem.is_empty() {
                stamps.insert(stem, frame.timestamp);
            }
        }
    }
    (stamps, intrinsics)
}

/// Reads intrinsics from `metadata.json` when present and well-formed.
fn load_metadata_intrinsics(path: &Path) -> Option<Intrinsics> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice::<SessionMetadata>(&bytes) {
        Ok(metadata) => metadata.camera_intrinsics,
        Err(err) => {
            warn!(metadata = %path.display(), error = %err, "ignoring malformed session metadata");
            None
        }
    }
}
