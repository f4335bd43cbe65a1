// crates/navslam-cli/src/main.rs
// ============================================================================
// Module: navslam CLI Entry Point
// Description: Command dispatcher for map database, engine, and job tooling.
// Purpose: Give operators direct access to every navslam pipeline stage.
// Dependencies: clap, navslam-config, navslam-core, navslam-engine, tokio
// ============================================================================

//! ## Overview
//! The `navslam` binary loads one configuration file, installs a `tracing`
//! subscriber on stderr, and dispatches to a subcommand. Results are written
//! to stdout as pretty JSON or short status lines; diagnostics and progress go
//! to stderr through `tracing`.
//!
//! Security posture: paths and map ids on the command line are untrusted;
//! map ids are validated by the map directory and query images are read with
//! a size limit.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use navslam_config::CONFIG_ENV_VAR;
use navslam_config::DEFAULT_CONFIG_NAME;
use navslam_config::NavslamConfig;
use navslam_config::config_toml_example;
use navslam_core::CaptureSession;
use navslam_core::JobKey;
use navslam_core::JobStatus;
use navslam_core::JobStatusStore;
use navslam_core::build_database;
use navslam_core::database::export_trajectory;
use navslam_core::extract_point_cloud;
use navslam_core::parse_database;
use navslam_engine::BuildTask;
use navslam_engine::EngineTransport;
use navslam_engine::JobQueue;
use navslam_engine::Localizer;
use navslam_engine::MapBuilder;
use navslam_engine::MapDirectory;
use navslam_engine::ProcessSupervisor;
use navslam_engine::RetryPolicy;
use navslam_engine::pipeline::INPUT_DATABASE_NAME;
use navslam_engine::pipeline::OUTPUT_DATABASE_NAME;
use navslam_store_sqlite::SqliteJobStore;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of one query image.
const MAX_QUERY_IMAGE_BYTES: u64 = 20 * 1024 * 1024;
/// Default point budget for `db cloud`.
const DEFAULT_CLOUD_POINTS: usize = 50_000;
/// Suffix for databases set aside by `reprocess`.
const BACKUP_SUFFIX: &str = "old";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "navslam", version, about = "Indoor map building and localization tooling")]
struct Cli {
    /// Config file (overrides `NAVSLAM_CONFIG`; defaults apply when absent).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Map database utilities that do not run the engine.
    Db {
        /// Selected database subcommand.
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Rebuild a capture session through the full engine pipeline.
    Reprocess(ReprocessCommand),
    /// Localize query images against a stored map.
    Localize(LocalizeCommand),
    /// Stored map utilities.
    Maps {
        /// Selected maps subcommand.
        #[command(subcommand)]
        command: MapsCommand,
    },
    /// Durable job queue utilities.
    Jobs {
        /// Selected jobs subcommand.
        #[command(subcommand)]
        command: JobsCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Validate,
    /// Print an annotated example configuration.
    Example,
}

/// Database subcommands.
#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Build an unprocessed input database from a capture session.
    Build {
        /// Capture session directory.
        session: PathBuf,
        /// Keep frames without depth.
        #[arg(long)]
        monocular: bool,
        /// Output path (defaults to `<session>/rtabmap_input.db`).
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Print a JSON summary of a map database.
    Inspect {
        /// Map database.
        database: PathBuf,
        /// Include every posed keyframe.
        #[arg(long)]
        keyframes: bool,
    },
    /// Export node poses as a TUM trajectory.
    Trajectory {
        /// Map database.
        database: PathBuf,
        /// Output trajectory file.
        output: PathBuf,
    },
    /// Print world-frame feature points as JSON.
    Cloud {
        /// Map database.
        database: PathBuf,
        /// Maximum points to return.
        #[arg(long, default_value_t = DEFAULT_CLOUD_POINTS)]
        max_points: usize,
    },
}

/// Arguments for `reprocess`.
#[derive(clap::Args, Debug)]
struct ReprocessCommand {
    /// Capture session directory.
    session: PathBuf,
    /// Keep frames without depth.
    #[arg(long)]
    monocular: bool,
}

/// Arguments for `localize`.
#[derive(clap::Args, Debug)]
struct LocalizeCommand {
    /// Map id (ignored in fixed map selection mode).
    map_id: String,
    /// Query images (1 to 5).
    #[arg(required = true, num_args = 1..=5)]
    images: Vec<PathBuf>,
}

/// Maps subcommands.
#[derive(Subcommand, Debug)]
enum MapsCommand {
    /// List stored maps.
    List,
    /// Write `<id>_meta.json` for a stored map.
    Metadata {
        /// Map id.
        map_id: String,
    },
}

/// Jobs subcommands.
#[derive(Subcommand, Debug)]
enum JobsCommand {
    /// Queue builds, wait for all of them, and print final statuses.
    Run {
        /// Jobs as `<key>=<session_dir>`.
        #[arg(required = true, value_parser = parse_job_spec)]
        jobs: Vec<JobSpec>,
        /// Keep frames without depth.
        #[arg(long)]
        monocular: bool,
    },
    /// Print the durable status and history of a job.
    Status {
        /// Job key.
        key: String,
    },
}

/// One `<key>=<session_dir>` job argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct JobSpec {
    /// Job key.
    key: String,
    /// Capture session directory.
    session: PathBuf,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Compact listing row for `maps list`.
#[derive(Debug, Serialize)]
struct MapRow {
    /// Map id.
    id: String,
    /// Database size in bytes.
    size_bytes: u64,
    /// Last modification time.
    modified: Option<String>,
    /// Whether a point cloud is stored.
    has_cloud: bool,
    /// Node count.
    keyframe_count: u64,
    /// Feature count.
    map_point_count: u64,
    /// Accepted loop closures.
    loop_closure_count: u64,
}

/// Result line for `reprocess`.
#[derive(Debug, Serialize)]
struct ReprocessReport {
    /// Frames stored in the input database.
    inserted: usize,
    /// Frames skipped for lack of depth.
    skipped: usize,
    /// Nodes in the processed map.
    keyframe_count: u64,
    /// Features in the processed map.
    map_point_count: u64,
    /// Accepted loop closures.
    loop_closure_count: u64,
    /// Processed database.
    database: PathBuf,
    /// Point cloud, when exported.
    cloud: Option<PathBuf>,
}

/// Final state of one job for `jobs run`.
#[derive(Debug, Serialize)]
struct JobOutcomeRow {
    /// Job key.
    key: String,
    /// Final status.
    status: Option<JobStatus>,
    /// Failure description.
    error: Option<String>,
}

/// Output for `jobs status`.
#[derive(Debug, Serialize)]
struct JobStatusReport {
    /// Job key.
    key: String,
    /// Current status.
    status: JobStatus,
    /// Failure description.
    error: Option<String>,
    /// Last update in unix milliseconds.
    updated_at_ms: i64,
    /// Every recorded status, oldest first.
    history: Vec<JobStatus>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments, loads configuration, and dispatches.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging.level);

    match cli.command {
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(&config),
        Commands::Config {
            command: ConfigCommand::Example,
        } => {
            write_stdout_line(config_toml_example().trim_end())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Db {
            command,
        } => command_db(&config, command),
        Commands::Reprocess(command) => command_reprocess(&config, &command).await,
        Commands::Localize(command) => command_localize(&config, &command).await,
        Commands::Maps {
            command,
        } => command_maps(&config, command).await,
        Commands::Jobs {
            command,
        } => command_jobs(&config, command).await,
    }
}

/// Loads the config file, falling back to defaults when none exists.
///
/// An explicit `--config` path or `NAVSLAM_CONFIG` must point at a file.
fn load_config(explicit: Option<&Path>) -> CliResult<NavslamConfig> {
    let implicit_default = explicit.is_none()
        && std::env::var_os(CONFIG_ENV_VAR).is_none()
        && !Path::new(DEFAULT_CONFIG_NAME).exists();
    if implicit_default {
        return Ok(NavslamConfig::default());
    }
    NavslamConfig::load(explicit).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Installs the stderr subscriber; `RUST_LOG` overrides the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(config: &NavslamConfig) -> CliResult<ExitCode> {
    config.validate().map_err(|err| CliError::new(format!("config invalid: {err}")))?;
    let transport = EngineTransport::from_config(&config.engine, &config.storage.data_dir);
    write_stdout_line(&format!(
        "config ok (engine: {}, data: {})",
        transport.label(),
        config.storage.data_dir.display()
    ))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Database Commands
// ============================================================================

/// Dispatches `db` subcommands.
fn command_db(config: &NavslamConfig, command: DbCommand) -> CliResult<ExitCode> {
    match command {
        DbCommand::Build {
            session,
            monocular,
            output,
        } => {
            let output = output.unwrap_or_else(|| session.join(INPUT_DATABASE_NAME));
            let loaded = CaptureSession::load(&session).map_err(|err| CliError::new(err.to_string()))?;
            let intrinsics = loaded
                .intrinsics
                .ok_or_else(|| CliError::new("no camera intrinsics found in capture session"))?;
            let parameters = config.parameter_set().map_err(|err| CliError::new(err.to_string()))?;
            let report = build_database(&loaded, &intrinsics, &parameters, monocular, &output)
                .map_err(|err| CliError::new(format!("database build failed: {err}")))?;
            write_json(&report)?;
        }
        DbCommand::Inspect {
            database,
            keyframes,
        } => {
            require_file(&database)?;
            let mut summary = parse_database(&database);
            if !keyframes {
                summary.keyframes.clear();
            }
            write_json(&summary)?;
        }
        DbCommand::Trajectory {
            database,
            output,
        } => {
            require_file(&database)?;
            let written = export_trajectory(&database, &output)
                .map_err(|err| CliError::new(format!("trajectory export failed: {err}")))?;
            write_stdout_line(&format!("wrote {written} poses to {}", output.display()))?;
        }
        DbCommand::Cloud {
            database,
            max_points,
        } => {
            require_file(&database)?;
            let points = extract_point_cloud(&database, max_points);
            write_json(&serde_json::json!({ "count": points.len(), "points": points }))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Engine Commands
// ============================================================================

/// Executes `reprocess`.
async fn command_reprocess(config: &NavslamConfig, command: &ReprocessCommand) -> CliResult<ExitCode> {
    let session = &command.session;
    if !session.is_dir() {
        return Err(CliError::new(format!("session not found: {}", session.display())));
    }
    for name in [INPUT_DATABASE_NAME, OUTPUT_DATABASE_NAME] {
        backup_previous(&session.join(name))?;
    }
    let key = session.file_name().map_or_else(|| "session".to_string(), |name| name.to_string_lossy().into_owned());
    let task = BuildTask {
        monocular: command.monocular,
        ..BuildTask::new(key, session.clone())
    };
    let mut progress = |percent: u8| info!(percent, "build progress");
    let outcome = builder(config)?
        .build_with_progress(&task, Some(&mut progress))
        .await
        .map_err(|err| CliError::new(format!("reprocess failed: {err}")))?;
    write_json(&ReprocessReport {
        inserted: outcome.report.inserted,
        skipped: outcome.report.skipped,
        keyframe_count: outcome.summary.keyframe_count,
        map_point_count: outcome.summary.map_point_count,
        loop_closure_count: outcome.summary.loop_closure_count,
        database: outcome.output_database,
        cloud: outcome.cloud,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `localize`.
async fn command_localize(config: &NavslamConfig, command: &LocalizeCommand) -> CliResult<ExitCode> {
    let mut images = Vec::with_capacity(command.images.len());
    for path in &command.images {
        images.push(read_query_image(path).await?);
    }
    let map_id = config.resolve_map_id(&command.map_id);
    let parameters = config.parameter_set().map_err(|err| CliError::new(err.to_string()))?;
    let localizer = Localizer::new(
        supervisor(config),
        MapDirectory::new(config.maps_dir()),
        config.sessions_dir(),
        parameters,
    );
    let found = localizer
        .localize(map_id, &images)
        .await
        .map_err(|err| CliError::new(format!("localization failed: {err}")))?;
    write_json(&found)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Maps Commands
// ============================================================================

/// Dispatches `maps` subcommands.
async fn command_maps(config: &NavslamConfig, command: MapsCommand) -> CliResult<ExitCode> {
    let maps = MapDirectory::new(config.maps_dir());
    match command {
        MapsCommand::List => {
            let listings = maps.list_maps().await.map_err(|err| CliError::new(err.to_string()))?;
            let rows: Vec<MapRow> = listings
                .into_iter()
                .map(|listing| MapRow {
                    id: listing.id,
                    size_bytes: listing.size_bytes,
                    modified: listing.modified,
                    has_cloud: listing.has_cloud,
                    keyframe_count: listing.summary.keyframe_count,
                    map_point_count: listing.summary.map_point_count,
                    loop_closure_count: listing.summary.loop_closure_count,
                })
                .collect();
            write_json(&rows)?;
        }
        MapsCommand::Metadata {
            map_id,
        } => {
            let path = maps.write_metadata(&map_id).await.map_err(|err| CliError::new(err.to_string()))?;
            write_stdout_line(&path.display().to_string())?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Jobs Commands
// ============================================================================

/// Dispatches `jobs` subcommands.
async fn command_jobs(config: &NavslamConfig, command: JobsCommand) -> CliResult<ExitCode> {
    let store = open_job_store(config)?;
    match command {
        JobsCommand::Run {
            jobs,
            monocular,
        } => command_jobs_run(config, store, jobs, monocular).await,
        JobsCommand::Status {
            key,
        } => {
            let key = JobKey::new(key);
            let record = store
                .read_status(&key)
                .map_err(|err| CliError::new(err.to_string()))?
                .ok_or_else(|| CliError::new(format!("unknown job: {key}")))?;
            let history = store.history(&key).map_err(|err| CliError::new(err.to_string()))?;
            write_json(&JobStatusReport {
                key: key.to_string(),
                status: record.status,
                error: record.error_message,
                updated_at_ms: record.updated_at_ms,
                history,
            })?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes `jobs run`: enqueue, drain, shut down, report.
async fn command_jobs_run(
    config: &NavslamConfig,
    store: SqliteJobStore,
    jobs: Vec<JobSpec>,
    monocular: bool,
) -> CliResult<ExitCode> {
    let queue = JobQueue::start(
        Arc::new(store),
        Arc::new(builder(config)?),
        Arc::new(MapDirectory::new(config.maps_dir())),
        RetryPolicy::from_config(&config.jobs),
    );
    let mut keys = Vec::with_capacity(jobs.len());
    for spec in jobs {
        let task = BuildTask {
            monocular,
            ..BuildTask::new(spec.key, spec.session)
        };
        let ticket = queue.enqueue(task).await.map_err(|err| CliError::new(err.to_string()))?;
        keys.push(ticket.key);
    }
    queue.wait_idle().await;

    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        let record = queue.status(&key).await.map_err(|err| CliError::new(err.to_string()))?;
        rows.push(JobOutcomeRow {
            key: key.to_string(),
            status: record.as_ref().map(|record| record.status),
            error: record.and_then(|record| record.error_message),
        });
    }
    queue.shutdown().await;
    write_json(&rows)?;
    if rows.iter().all(|row| row.status == Some(JobStatus::Completed)) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the shared engine supervisor from configuration.
fn supervisor(config: &NavslamConfig) -> Arc<ProcessSupervisor> {
    let transport = EngineTransport::from_config(&config.engine, &config.storage.data_dir);
    Arc::new(ProcessSupervisor::new(transport, config.timeouts))
}

/// Opens the durable job store and checks that it answers queries.
fn open_job_store(config: &NavslamConfig) -> CliResult<SqliteJobStore> {
    let store = SqliteJobStore::new(&config.job_store_config())
        .map_err(|err| CliError::new(format!("job store open failed: {err}")))?;
    store.readiness().map_err(|err| CliError::new(format!("job store not ready: {err}")))?;
    Ok(store)
}

/// Builds the map builder from configuration.
fn builder(config: &NavslamConfig) -> CliResult<MapBuilder> {
    let parameters = config.parameter_set().map_err(|err| CliError::new(err.to_string()))?;
    Ok(MapBuilder::new(supervisor(config), parameters))
}

/// Parses a `<key>=<session_dir>` job argument.
fn parse_job_spec(value: &str) -> Result<JobSpec, String> {
    let Some((key, session)) = value.split_once('=') else {
        return Err(format!("expected <key>=<session_dir>, got {value}"));
    };
    let key = key.trim();
    let session = session.trim();
    if key.is_empty() || session.is_empty() {
        return Err(format!("expected <key>=<session_dir>, got {value}"));
    }
    Ok(JobSpec {
        key: key.to_string(),
        session: PathBuf::from(session),
    })
}

/// Renames `path` to `<path>.old`, replacing an older backup.
///
/// Returns whether a backup was made.
fn backup_previous(path: &Path) -> CliResult<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let mut backup = path.as_os_str().to_owned();
    backup.push(".");
    backup.push(BACKUP_SUFFIX);
    let backup = PathBuf::from(backup);
    if backup.exists() {
        fs::remove_file(&backup)
            .map_err(|err| CliError::new(format!("cannot replace {}: {err}", backup.display())))?;
    }
    fs::rename(path, &backup)
        .map_err(|err| CliError::new(format!("cannot back up {}: {err}", path.display())))?;
    info!(from = %path.display(), to = %backup.display(), "previous database backed up");
    Ok(true)
}

/// Reads one query image, enforcing the size limit.
async fn read_query_image(path: &Path) -> CliResult<Vec<u8>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|err| CliError::new(format!("cannot read {}: {err}", path.display())))?;
    if metadata.len() > MAX_QUERY_IMAGE_BYTES {
        return Err(CliError::new(format!("{} exceeds the query image size limit", path.display())));
    }
    tokio::fs::read(path)
        .await
        .map_err(|err| CliError::new(format!("cannot read {}: {err}", path.display())))
}

/// Fails unless `path` is an existing file.
fn require_file(path: &Path) -> CliResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CliError::new(format!("database not found: {}", path.display())))
    }
}

/// Writes `value` as pretty JSON followed by a newline.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("json encoding failed: {err}")))?;
    write_stdout_line(&text)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::new(format!("stdout write failed: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
