// crates/navslam-engine/tests/invocation.rs
// ============================================================================
// Module: Engine Invocation Tests
// Description: Command rendering for direct and managed transports.
// ============================================================================

//! Engine invocation rendering tests.

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

use std::path::Path;
use std::path::PathBuf;

use navslam_config::EngineConfig;
use navslam_core::ParameterSet;
use navslam_engine::EngineInvocation;
use navslam_engine::EngineProgram;
use navslam_engine::EngineTransport;
use navslam_engine::OperationKind;
use navslam_engine::invocation::shell_quote;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn managed() -> EngineTransport {
    EngineTransport::Managed {
        container: "rtabmap".to_string(),
        runtime: "docker".to_string(),
        host_data_root: PathBuf::from("/srv/navslam/data"),
        container_data_root: PathBuf::from("/data"),
    }
}

fn direct() -> EngineTransport {
    EngineTransport::Direct {
        install_dir: PathBuf::from("/nonexistent/rtabmap"),
    }
}

fn two_params() -> ParameterSet {
    let mut params = ParameterSet::new();
    params.insert("Mem/IncrementalMemory", "true").unwrap();
    params.insert("Kp/MaxFeatures", "1000").unwrap();
    params
}

// ============================================================================
// SECTION: Transport Selection
// ============================================================================

#[test]
fn docker_prefixed_engine_path_selects_managed_transport() {
    let engine = EngineConfig::default();
    let transport = EngineTransport::from_config(&engine, Path::new("/srv/data"));
    assert!(transport.is_managed());
    assert_eq!(transport.label(), "managed");
    match transport {
        EngineTransport::Managed {
            container,
            runtime,
            host_data_root,
            container_data_root,
        } => {
            assert_eq!(container, "rtabmap");
            assert_eq!(runtime, "docker");
            assert_eq!(host_data_root, PathBuf::from("/srv/data"));
            assert_eq!(container_data_root, PathBuf::from("/data"));
        }
        EngineTransport::Direct { .. } => panic!("expected managed transport"),
    }
}

#[test]
fn plain_engine_path_selects_direct_transport() {
    let engine = EngineConfig {
        path: "/opt/rtabmap".to_string(),
        ..EngineConfig::default()
    };
    let transport = EngineTransport::from_config(&engine, Path::new("/srv/data"));
    assert_eq!(
        transport,
        EngineTransport::Direct {
            install_dir: PathBuf::from("/opt/rtabmap"),
        }
    );
}

#[test]
fn managed_paths_are_rewritten_under_the_container_root() {
    let transport = managed();
    assert_eq!(
        transport.engine_path(Path::new("/srv/navslam/data/sessions/s1/rtabmap.db")),
        PathBuf::from("/data/sessions/s1/rtabmap.db")
    );
    assert_eq!(transport.engine_path(Path::new("/tmp/outside.db")), PathBuf::from("/tmp/outside.db"));
    assert_eq!(direct().engine_path(Path::new("/srv/navslam/data/a.db")), PathBuf::from("/srv/navslam/data/a.db"));
}

#[test]
fn direct_program_falls_back_to_bare_name() {
    assert_eq!(direct().direct_program("rtabmap-console"), PathBuf::from("rtabmap-console"));
}

// ============================================================================
// SECTION: Argument Shapes
// ============================================================================

#[test]
fn reprocess_renders_odom_params_then_paths() {
    let invocation =
        EngineInvocation::reprocess(Path::new("/w/in.db"), Path::new("/w/out.db"), &two_params());
    assert_eq!(invocation.program(), EngineProgram::Reprocess);
    assert_eq!(invocation.operation(), OperationKind::Build);
    let command = invocation.command_line(&direct());
    assert_eq!(command.program, PathBuf::from("rtabmap-reprocess"));
    assert_eq!(
        command.args,
        vec![
            "-odom",
            "-param",
            "Mem/IncrementalMemory",
            "true",
            "-param",
            "Kp/MaxFeatures",
            "1000",
            "/w/in.db",
            "/w/out.db",
        ]
    );
}

#[test]
fn console_renders_params_before_input_map_and_images() {
    let invocation =
        EngineInvocation::console(Path::new("/w/map.db"), Path::new("/w/q/images"), &two_params());
    assert_eq!(invocation.operation(), OperationKind::Localize);
    let command = invocation.command_line(&direct());
    assert_eq!(command.program, PathBuf::from("rtabmap-console"));
    let tail: Vec<&str> = command.args.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(tail, vec!["-input", "/w/map.db", "/w/q/images"]);
    assert_eq!(command.args.first().map(String::as_str), Some("-param"));
}

#[test]
fn export_renders_output_dir_with_trailing_slash() {
    let invocation = EngineInvocation::export(Path::new("/w/s/rtabmap.db"), Path::new("/w/s"));
    assert_eq!(invocation.operation(), OperationKind::Export);
    let command = invocation.command_line(&direct());
    assert_eq!(
        command.args,
        vec!["--cloud", "--opt", "3", "--output_dir", "/w/s/", "/w/s/rtabmap.db"]
    );
}

// ============================================================================
// SECTION: Managed Rendering
// ============================================================================

#[test]
fn managed_invocation_is_one_shell_command_inside_the_container() {
    let invocation = EngineInvocation::reprocess(
        Path::new("/srv/navslam/data/sessions/s1/rtabmap_input.db"),
        Path::new("/srv/navslam/data/sessions/s1/rtabmap.db"),
        &two_params(),
    );
    let command = invocation.command_line(&managed());
    assert_eq!(command.program, PathBuf::from("docker"));
    assert_eq!(command.args.len(), 5);
    assert_eq!(&command.args[..4], ["exec", "rtabmap", "bash", "-c"]);
    assert_eq!(
        command.args[4],
        "rtabmap-reprocess -odom -param Mem/IncrementalMemory true -param Kp/MaxFeatures 1000 \
         /data/sessions/s1/rtabmap_input.db /data/sessions/s1/rtabmap.db"
    );
}

#[test]
fn managed_invocation_quotes_unsafe_paths() {
    let invocation = EngineInvocation::export(
        Path::new("/srv/navslam/data/maps/it's here.db"),
        Path::new("/srv/navslam/data/maps"),
    );
    let command = invocation.command_line(&managed());
    assert_eq!(
        command.args[4],
        r"rtabmap-export --cloud --opt 3 --output_dir /data/maps/ '/data/maps/it'\''s here.db'"
    );
}

#[test]
fn kill_command_exists_only_for_managed_transport() {
    let invocation = EngineInvocation::export(Path::new("/w/a.db"), Path::new("/w"));
    assert!(invocation.kill_command(&direct()).is_none());
    let kill = invocation.kill_command(&managed()).unwrap();
    assert_eq!(kill.program, PathBuf::from("docker"));
    assert_eq!(kill.args, vec!["exec", "rtabmap", "pkill", "-9", "-f", "rtabmap-export"]);
}

#[test]
fn shell_quote_leaves_safe_words_alone() {
    assert_eq!(shell_quote("/data/a-b_c.db"), "/data/a-b_c.db");
    assert_eq!(shell_quote("Grid/CellSize"), "Grid/CellSize");
    assert_eq!(shell_quote(""), "''");
    assert_eq!(shell_quote("a b"), "'a b'");
    assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
}

#[test]
fn operation_budgets_follow_timeout_config() {
    let timeouts = navslam_config::TimeoutConfig::default();
    assert_eq!(OperationKind::Build.budget(&timeouts).as_secs(), 600);
    assert_eq!(OperationKind::Localize.budget(&timeouts).as_secs(), 30);
    assert_eq!(OperationKind::Export.budget(&timeouts).as_secs(), 120);
}
