// crates/navslam-engine/tests/engine_pipeline.rs
// ============================================================================
// Module: Engine Pipeline Tests
// Description: Build, archive, and localize flows against scripted engines.
// ============================================================================

//! Build and localization pipeline tests.
//!
//! The engine programs are small shell scripts installed into a temporary
//! direct-transport install directory: reprocess copies its input database to
//! its output, export writes a stub cloud, and console prints match markers.

#![cfg(unix)]
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

use std::fs;
use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use image::ImageBuffer;
use image::ImageFormat;
use image::Luma;
use image::RgbImage;
use navslam_config::TimeoutConfig;
use navslam_core::JobKey;
use navslam_core::MatchKind;
use navslam_core::ParameterSet;
use navslam_engine::BuildTask;
use navslam_engine::EngineError;
use navslam_engine::EngineTransport;
use navslam_engine::Localizer;
use navslam_engine::MapArchive;
use navslam_engine::MapBuilder;
use navslam_engine::MapDirectory;
use navslam_engine::ProcessSupervisor;
use navslam_engine::SupervisorError;
use tempfile::TempDir;

// ============================================================================
// SECTION: Scripted Engine
// ============================================================================

const REPROCESS: &str = r#"#!/bin/sh
eval "in=\${$(($# - 1))}"
eval "out=\${$#}"
dir=$(dirname "$out")
if [ -f "$dir/FAIL" ]; then echo "reprocess failed" 1>&2; exit 2; fi
if [ -f "$dir/SKIP" ]; then exit 0; fi
for i in 1 2 3; do echo "Processing image $i"; done
cp "$in" "$out"
"#;

const EXPORT: &str = r#"#!/bin/sh
if [ -f "${5}NOEXPORT" ]; then exit 1; fi
printf 'ply\n' > "${5}rtabmap_cloud.ply"
"#;

const CONSOLE: &str = r#"#!/bin/sh
for last; do :; done
[ -f "$last/query_0.jpg" ] || { echo "no query image" 1>&2; exit 7; }
echo "iteration(1) high(1) hyp(0.20)"
echo "iteration(2) loop(2) hyp(0.60)"
"#;

struct Fixture {
    _root: TempDir,
    data: PathBuf,
    supervisor: Arc<ProcessSupervisor>,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let bin = root.path().join("engine").join("bin");
        fs::create_dir_all(&bin).unwrap();
        for (name, body) in
            [("rtabmap-reprocess", REPROCESS), ("rtabmap-export", EXPORT), ("rtabmap-console", CONSOLE)]
        {
            let path = bin.join(name);
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let data = root.path().join("data");
        fs::create_dir_all(data.join("sessions")).unwrap();
        let transport = EngineTransport::Direct {
            install_dir: root.path().join("engine"),
        };
        let supervisor = Arc::new(ProcessSupervisor::new(transport, TimeoutConfig::default()));
        Self {
            _root: root,
            data,
            supervisor,
        }
    }

    fn builder(&self) -> MapBuilder {
        MapBuilder::new(Arc::clone(&self.supervisor), ParameterSet::defaults())
    }

    fn maps(&self) -> MapDirectory {
        MapDirectory::new(self.data.join("maps"))
    }

    fn localizer(&self) -> Localizer {
        Localizer::new(
            Arc::clone(&self.supervisor),
            self.maps(),
            self.data.join("sessions"),
            ParameterSet::defaults(),
        )
    }

    /// Writes a three-frame RGB-D session and returns its directory.
    fn session(&self, name: &str, with_intrinsics: bool) -> PathBuf {
        let root = self.data.join("sessions").join(name);
        fs::create_dir_all(root.join("images")).unwrap();
        fs::create_dir_all(root.join("depth")).unwrap();
        fs::create_dir_all(root.join("chunks")).unwrap();
        let mut chunk = Vec::new();
        for index in 0..3_u32 {
            let stem = format!("{index:06}");
            fs::write(root.join("images").join(format!("{stem}.jpg")), format!("rgb-{index}")).unwrap();
            let depth: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(4, 3, Luma([1200]));
            depth.save(root.join("depth").join(format!("{stem}.png"))).unwrap();
            let mut frame = serde_json::json!({
                "image_path": format!("images/{stem}.jpg"),
                "timestamp": 1_700_000_000_000.0 + 100.0 * f64::from(index),
            });
            if with_intrinsics {
                frame["camera_intrinsics"] =
                    serde_json::json!({"fx": 7.5, "fy": 7.5, "cx": 4.0, "cy": 3.0, "width": 8, "height": 6});
            }
            chunk.push(frame);
        }
        fs::write(root.join("chunks").join("chunk_0000.json"), serde_json::to_vec(&chunk).unwrap())
            .unwrap();
        root
    }
}

fn query_image(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::new(width, height).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

fn leftover_query_sessions(sessions: &Path) -> usize {
    fs::read_dir(sessions)
        .unwrap()
        .filter(|entry| entry.as_ref().unwrap().file_name().to_string_lossy().starts_with("reloc_"))
        .count()
}

// ============================================================================
// SECTION: Build
// ============================================================================

#[tokio::test]
async fn build_reports_progress_and_produces_a_parsed_map() {
    let fixture = Fixture::new();
    let session = fixture.session("s1", true);
    let mut reports = Vec::new();
    let mut progress = |percent: u8| reports.push(percent);
    let outcome = fixture
        .builder()
        .build_with_progress(&BuildTask::new("lobby", &session), Some(&mut progress))
        .await
        .unwrap();

    assert_eq!(outcome.report.inserted, 3);
    assert_eq!(outcome.report.skipped, 0);
    assert_eq!(outcome.output_database, session.join("rtabmap.db"));
    assert_eq!(outcome.cloud, Some(session.join("rtabmap_cloud.ply")));
    assert_eq!(outcome.summary.keyframe_count, 3);
    assert_eq!(outcome.summary.keyframes.len(), 3);

    assert_eq!(reports, vec![5, 10, 30, 48, 66, 85, 90, 100]);
}

#[tokio::test]
async fn export_failure_is_not_fatal() {
    let fixture = Fixture::new();
    let session = fixture.session("s2", true);
    fs::write(session.join("NOEXPORT"), b"").unwrap();
    let outcome = fixture.builder().build_with_progress(&BuildTask::new("hall", &session), None).await.unwrap();
    assert_eq!(outcome.cloud, None);
    assert_eq!(outcome.summary.keyframe_count, 3);
}

#[tokio::test]
async fn engine_failure_surfaces_with_stderr() {
    let fixture = Fixture::new();
    let session = fixture.session("s3", true);
    fs::write(session.join("FAIL"), b"").unwrap();
    let err = fixture.builder().build_with_progress(&BuildTask::new("x", &session), None).await.unwrap_err();
    match err {
        EngineError::Supervisor(SupervisorError::EngineFailure {
            code,
            stderr,
            ..
        }) => {
            assert_eq!(code, 2);
            assert!(stderr.contains("reprocess failed"));
        }
        other => panic!("expected EngineFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_engine_without_output_is_an_error() {
    let fixture = Fixture::new();
    let session = fixture.session("s4", true);
    fs::write(session.join("SKIP"), b"").unwrap();
    let err = fixture.builder().build_with_progress(&BuildTask::new("x", &session), None).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingOutput(path) if path == session.join("rtabmap.db")));
}

#[tokio::test]
async fn session_without_intrinsics_is_rejected() {
    let fixture = Fixture::new();
    let session = fixture.session("s5", false);
    let err = fixture.builder().build_with_progress(&BuildTask::new("x", &session), None).await.unwrap_err();
    assert!(matches!(err, EngineError::Session(_)), "got {err:?}");
}

// ============================================================================
// SECTION: Map Directory
// ============================================================================

#[tokio::test]
async fn archived_map_is_listed_with_metadata() {
    let fixture = Fixture::new();
    let session = fixture.session("s6", true);
    let outcome = fixture.builder().build_with_progress(&BuildTask::new("atrium", &session), None).await.unwrap();
    let maps = fixture.maps();
    maps.persist(&JobKey::new("atrium"), &outcome).await.unwrap();

    assert!(maps.map_path("atrium").unwrap().is_file());
    assert!(maps.cloud_path("atrium").unwrap().is_file());
    let listings = maps.list_maps().await.unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].id, "atrium");
    assert!(listings[0].has_cloud);
    assert!(listings[0].modified.is_some());
    assert_eq!(listings[0].summary.keyframe_count, 3);

    let metadata: serde_json::Value =
        serde_json::from_slice(&fs::read(maps.metadata_path("atrium").unwrap()).unwrap()).unwrap();
    assert_eq!(metadata["map_id"], "atrium");
    assert_eq!(metadata["engine"], "rtabmap");
    assert_eq!(metadata["keyframe_count"], 3);
    assert_eq!(metadata["keyframes"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unreadable_map_lists_with_empty_summary() {
    let fixture = Fixture::new();
    let maps = fixture.maps();
    fs::create_dir_all(maps.root()).unwrap();
    fs::write(maps.root().join("broken.db"), b"not sqlite").unwrap();
    fs::write(maps.root().join("notes.txt"), b"ignored").unwrap();
    let listings = maps.list_maps().await.unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].id, "broken");
    assert_eq!(listings[0].summary.keyframe_count, 0);
    assert!(!listings[0].has_cloud);
}

#[tokio::test]
async fn missing_map_directory_lists_empty() {
    let fixture = Fixture::new();
    assert!(fixture.maps().list_maps().await.unwrap().is_empty());
    assert!(matches!(fixture.maps().load_map("ghost").await, Err(EngineError::MapNotFound(_))));
    assert!(matches!(fixture.maps().load_map("../ghost").await, Err(EngineError::InvalidMapId(_))));
}

// ============================================================================
// SECTION: Localization
// ============================================================================

#[tokio::test]
async fn localization_resolves_accepted_loop_pose_and_cleans_up() {
    let fixture = Fixture::new();
    let session = fixture.session("s7", true);
    let outcome = fixture.builder().build_with_progress(&BuildTask::new("plaza", &session), None).await.unwrap();
    fixture.maps().save_map("plaza", &outcome).await.unwrap();

    let found = fixture.localizer().localize("plaza", &[query_image(8, 6)]).await.unwrap();
    assert_eq!(found.map_id, "plaza");
    assert_eq!(found.node_id, 2);
    assert_eq!(found.kind, MatchKind::AcceptedLoop);
    assert!((found.confidence - 0.8).abs() < 1e-9);
    assert_eq!(found.position, [0.0, 0.0, 0.0]);
    assert_eq!(found.intrinsics.width, 8);
    assert_eq!(found.intrinsics.height, 6);
    assert_eq!(leftover_query_sessions(&fixture.data.join("sessions")), 0);
}

#[tokio::test]
async fn localization_scales_intrinsics_to_query_resolution() {
    let fixture = Fixture::new();
    let session = fixture.session("s8", true);
    let outcome = fixture.builder().build_with_progress(&BuildTask::new("yard", &session), None).await.unwrap();
    fixture.maps().save_map("yard", &outcome).await.unwrap();

    let found = fixture.localizer().localize("yard", &[query_image(16, 12)]).await.unwrap();
    assert_eq!(found.intrinsics.width, 16);
    assert!((found.intrinsics.fx - 15.0).abs() < 1e-9);
    assert!((found.intrinsics.cy - 6.0).abs() < 1e-9);
}

#[tokio::test]
async fn localization_rejects_bad_requests() {
    let fixture = Fixture::new();
    let localizer = fixture.localizer();
    assert!(matches!(localizer.localize("plaza", &[]).await, Err(EngineError::InvalidQuery(_))));
    let six = vec![query_image(8, 6); 6];
    assert!(matches!(localizer.localize("plaza", &six).await, Err(EngineError::InvalidQuery(_))));
    assert!(matches!(
        localizer.localize("nowhere", &[query_image(8, 6)]).await,
        Err(EngineError::MapNotFound(_))
    ));
}
