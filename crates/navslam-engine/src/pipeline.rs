// crates/navslam-engine/src/pipeline.rs
// ============================================================================
// Module: Map Build Pipeline
// Description: Capture session to processed map database.
// Purpose: Run build, reprocess, export, and parse as one unit of work.
// Dependencies: navslam-core, async-trait, tokio, tracing
// ============================================================================

//! ## Overview
//! [`MapBuilder`] turns a capture session directory into a processed map
//! database: it resolves intrinsics, writes the unprocessed input database,
//! runs the engine's reprocess step under the build budget, exports the
//! point-cloud companion on a best-effort basis, and parses the result.
//! Blocking database work runs on the blocking pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use navslam_core::BuildReport;
use navslam_core::CaptureSession;
use navslam_core::JobKey;
use navslam_core::MapSummary;
use navslam_core::ParameterSet;
use navslam_core::build_database;
use navslam_core::parse_database;
use tracing::info;
use tracing::warn;

use crate::errors::EngineError;
use crate::invocation::EngineInvocation;
use crate::supervisor::ProcessSupervisor;
use crate::supervisor::ProgressTracker;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Unprocessed database written from the capture session.
pub const INPUT_DATABASE_NAME: &str = "rtabmap_input.db";
/// Processed database written by the engine.
pub const OUTPUT_DATABASE_NAME: &str = "rtabmap.db";
/// Point-cloud companion written by the exporter.
pub const CLOUD_FILE_NAME: &str = "rtabmap_cloud.ply";

// ============================================================================
// SECTION: Types
// ============================================================================

/// One map build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTask {
    /// Job key; also the map id the result is saved under.
    pub key: JobKey,
    /// Capture session directory.
    pub session_dir: PathBuf,
    /// Skip the depth requirement for frames.
    pub monocular: bool,
}

impl BuildTask {
    /// Creates an RGB-D build task.
    #[must_use]
    pub fn new(key: impl Into<String>, session_dir: impl Into<PathBuf>) -> Self {
        Self {
            key: JobKey::new(key),
            session_dir: session_dir.into(),
            monocular: false,
        }
    }
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    /// Job key.
    pub key: JobKey,
    /// Input database build report.
    pub report: BuildReport,
    /// Processed database.
    pub output_database: PathBuf,
    /// Point-cloud companion, when the export produced one.
    pub cloud: Option<PathBuf>,
    /// Parsed summary of the processed database.
    pub summary: MapSummary,
}

/// Runs one build task end to end.
#[async_trait]
pub trait MapBuildPipeline: Send + Sync {
    /// Builds the map for `task`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when any required step fails.
    async fn build(&self, task: &BuildTask) -> Result<BuildOutcome, EngineError>;
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Engine-backed [`MapBuildPipeline`].
#[derive(Debug, Clone)]
pub struct MapBuilder {
    /// Shared engine supervisor.
    supervisor: Arc<ProcessSupervisor>,
    /// Parameters stored in the input database and passed to reprocess.
    parameters: ParameterSet,
}

impl MapBuilder {
    /// Creates a builder.
    #[must_use]
    pub const fn new(supervisor: Arc<ProcessSupervisor>, parameters: ParameterSet) -> Self {
        Self {
            supervisor,
            parameters,
        }
    }

    /// Builds the map for `task`, reporting percent complete to `progress`.
    ///
    /// Reports only ever increase; engine output markers may move the
    /// percentage past a later fixed step, which is then skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session is unusable, the input build
    /// fails, or the reprocess step fails, times out, or writes nothing.
    pub async fn build_with_progress(
        &self,
        task: &BuildTask,
        mut progress: Option<&mut (dyn FnMut(u8) + Send)>,
    ) -> Result<BuildOutcome, EngineError> {
        let mut reported = 0_u8;
        let mut report_progress = |percent: u8| {
            if percent <= reported {
                return;
            }
            reported = percent;
            if let Some(sink) = progress.as_deref_mut() {
                sink(percent);
            }
        };
        info!(job = %task.key, session = %task.session_dir.display(), "map build started");
        report_progress(5);

        let session_dir = task.session_dir.clone();
        let session =
            tokio::task::spawn_blocking(move || CaptureSession::load(&session_dir)).await??;
        let intrinsics = session.intrinsics.ok_or_else(|| {
            EngineError::Session("no camera intrinsics found in capture session".to_string())
        })?;
        report_progress(10);

        let input = task.session_dir.join(INPUT_DATABASE_NAME);
        let output = task.session_dir.join(OUTPUT_DATABASE_NAME);
        let report = {
            let parameters = self.parameters.clone();
            let input = input.clone();
            let monocular = task.monocular;
            tokio::task::spawn_blocking(move || {
                build_database(&session, &intrinsics, &parameters, monocular, &input)
            })
            .await??
        };
        report_progress(30);

        let mut reprocess_parameters = self.parameters.clone();
        reprocess_parameters.insert("RGBD/Enabled", "true")?;
        let invocation = EngineInvocation::reprocess(&input, &output, &reprocess_parameters);
        let mut tracker = ProgressTracker::new(report.inserted);
        let mut on_line = |line: &str| {
            if let Some(percent) = tracker.observe(line) {
                report_progress(percent);
            }
        };
        self.supervisor.run(&invocation, Some(&mut on_line)).await?;
        if !tokio::fs::try_exists(&output).await? {
            return Err(EngineError::MissingOutput(output));
        }
        report_progress(80);

        let cloud = self.export_cloud(&output, &task.session_dir).await;
        report_progress(90);

        let parse_path = output.clone();
        let summary = tokio::task::spawn_blocking(move || parse_database(&parse_path)).await?;
        report_progress(100);
        info!(
            job = %task.key,
            keyframes = summary.keyframe_count,
            map_points = summary.map_point_count,
            loop_closures = summary.loop_closure_count,
            "map build completed"
        );
        Ok(BuildOutcome {
            key: task.key.clone(),
            report,
            output_database: output,
            cloud,
            summary,
        })
    }

    /// Exports the dense point cloud; failures are logged, not raised.
    async fn export_cloud(&self, database: &Path, session_dir: &Path) -> Option<PathBuf> {
        let invocation = EngineInvocation::export(database, session_dir);
        if let Err(err) = self.supervisor.run(&invocation, None).await {
            warn!(error = %err, "point cloud export failed; continuing without it");
            return None;
        }
        let cloud = session_dir.join(CLOUD_FILE_NAME);
        match tokio::fs::try_exists(&cloud).await {
            Ok(true) => Some(cloud),
            Ok(false) => {
                warn!(path = %cloud.display(), "point cloud export wrote no file");
                None
            }
            Err(err) => {
                warn!(error = %err, "point cloud export check failed");
                None
            }
        }
    }
}

#[async_trait]
impl MapBuildPipeline for MapBuilder {
    async fn build(&self, task: &BuildTask) -> Result<BuildOutcome, EngineError> {
        self.build_with_progress(task, None).await
    }
}
