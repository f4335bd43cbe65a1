// crates/navslam-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and file helpers.
// Purpose: Keep job arguments, backups, and read limits predictable.
// Dependencies: navslam-cli main helpers, tempfile
// ============================================================================

//! ## Overview
//! Validates job argument parsing, the `.old` backup rotation used by
//! `reprocess`, query image read limits, and the clap definition itself.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;

use clap::CommandFactory;
use clap::Parser;

use super::Cli;
use super::Commands;
use super::JobSpec;
use super::JobsCommand;
use super::MAX_QUERY_IMAGE_BYTES;
use super::NavslamConfig;
use super::backup_previous;
use super::open_job_store;
use super::parse_job_spec;
use super::read_query_image;
use super::require_file;

// ============================================================================
// SECTION: Argument Parsing
// ============================================================================

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn job_spec_splits_on_first_equals() {
    let spec = parse_job_spec("lobby=/data/sessions/a=b").unwrap();
    assert_eq!(
        spec,
        JobSpec {
            key: "lobby".to_string(),
            session: PathBuf::from("/data/sessions/a=b"),
        }
    );
}

#[test]
fn job_spec_rejects_missing_parts() {
    assert!(parse_job_spec("lobby").is_err());
    assert!(parse_job_spec("=/data").is_err());
    assert!(parse_job_spec("lobby=").is_err());
}

#[test]
fn jobs_run_accepts_multiple_specs() {
    let cli = Cli::try_parse_from(["navslam", "jobs", "run", "a=/s/a", "b=/s/b", "--monocular"]).unwrap();
    let Commands::Jobs {
        command: JobsCommand::Run {
            jobs,
            monocular,
        },
    } = cli.command
    else {
        panic!("unexpected command");
    };
    assert!(monocular);
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].key, "b");
}

#[test]
fn localize_limits_image_count() {
    let mut args = vec!["navslam", "localize", "lobby"];
    assert!(Cli::try_parse_from(&args).is_err());
    args.extend(["1.jpg", "2.jpg", "3.jpg", "4.jpg", "5.jpg"]);
    assert!(Cli::try_parse_from(&args).is_ok());
    args.push("6.jpg");
    assert!(Cli::try_parse_from(&args).is_err());
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

#[test]
fn backup_replaces_older_backup() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("rtabmap.db");
    let old = dir.path().join("rtabmap.db.old");

    assert!(!backup_previous(&db).unwrap());

    fs::write(&old, b"stale").unwrap();
    fs::write(&db, b"current").unwrap();
    assert!(backup_previous(&db).unwrap());
    assert!(!db.exists());
    assert_eq!(fs::read(&old).unwrap(), b"current");
}

#[test]
fn require_file_rejects_directories() {
    let dir = tempfile::tempdir().unwrap();
    assert!(require_file(dir.path()).is_err());
    let file = dir.path().join("map.db");
    fs::write(&file, b"").unwrap();
    assert!(require_file(&file).is_ok());
}

#[tokio::test]
async fn query_images_over_the_limit_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let small = dir.path().join("small.jpg");
    fs::write(&small, b"jpeg").unwrap();
    assert_eq!(read_query_image(&small).await.unwrap(), b"jpeg");

    let large = dir.path().join("large.jpg");
    let file = fs::File::create(&large).unwrap();
    file.set_len(MAX_QUERY_IMAGE_BYTES + 1).unwrap();
    let err = read_query_image(&large).await.unwrap_err();
    assert!(err.to_string().contains("size limit"));

    assert!(read_query_image(&dir.path().join("missing.jpg")).await.is_err());
}

#[test]
fn job_store_opens_under_the_data_dir_and_answers() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NavslamConfig::default();
    config.storage.data_dir = dir.path().join("data");
    open_job_store(&config).unwrap();
    assert!(config.job_store_config().path.exists());
}
