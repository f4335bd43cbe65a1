// crates/navslam-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Job Status Store
// Description: Durable JobStatusStore backed by SQLite WAL.
// Purpose: Persist map job status rows and their append-only history.
// Dependencies: navslam-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements a durable [`JobStatusStore`] using `SQLite`. The
//! `map_jobs` table holds the latest status per job; every write also appends
//! a row to `map_job_events`, and neither table is ever pruned. Busy and
//! locked database conditions map to transient [`StoreError`] variants so the
//! job queue's retry wrapper can back off and try again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use navslam_core::JobKey;
use navslam_core::JobRecord;
use navslam_core::JobStatus;
use navslam_core::JobStatusStore;
use navslam_core::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the job store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum accepted job key length.
const MAX_JOB_KEY_LENGTH: usize = 255;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` job status store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a config for `path` with default timeout and pragmas.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` job store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// Database could not be opened.
    #[error("sqlite store unavailable: {0}")]
    Unavailable(String),
    /// Database was busy or locked past the busy timeout.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored rows are not interpretable.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid caller input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        let code = error.sqlite_error_code();
        match code {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::Busy(error.to_string())
            }
            Some(ErrorCode::CannotOpen) => Self::Unavailable(error.to_string()),
            Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => {
                Self::Corrupt(error.to_string())
            }
            _ => Self::Db(error.to_string()),
        }
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Unavailable(message) => Self::Unavailable(message),
            SqliteStoreError::Busy(message) => Self::Busy(message),
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Corrupt(message)
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed job status store with WAL support.
#[derive(Clone)]
pub struct SqliteJobStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Opens an `SQLite`-backed job status store, creating the schema on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// carries an unsupported schema version.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "opened sqlite job store");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the latest row of every job, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or a stored status
    /// label is unknown.
    pub fn list_jobs(&self) -> Result<Vec<JobRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare(
            "SELECT job_key, status, error_message, updated_at FROM map_jobs ORDER BY job_key",
        )?;
        let rows = statement.query_map(params![], raw_job_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    /// Returns every status recorded for `key`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or a stored status
    /// label is unknown.
    pub fn history(&self, key: &JobKey) -> Result<Vec<JobStatus>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement =
            guard.prepare("SELECT status FROM map_job_events WHERE job_key = ?1 ORDER BY seq")?;
        let labels = statement.query_map(params![key.as_str()], |row| row.get::<_, String>(0))?;
        let mut statuses = Vec::new();
        for label in labels {
            statuses.push(parse_status(&label?)?);
        }
        Ok(statuses)
    }

    /// Acquires the connection lock.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Writes the latest status row and appends a history event atomically.
    fn write_status(
        &self,
        key: &JobKey,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), SqliteStoreError> {
        validate_job_key(key)?;
        let now = unix_millis();
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        tx.execute(
            "INSERT INTO map_jobs (job_key, status, error_message, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) ON CONFLICT(job_key) DO UPDATE SET status = \
             excluded.status, error_message = excluded.error_message, updated_at = \
             excluded.updated_at",
            params![key.as_str(), status.as_str(), error_message, now],
        )?;
        tx.execute(
            "INSERT INTO map_job_events (job_key, status, error_message, recorded_at) VALUES \
             (?1, ?2, ?3, ?4)",
            params![key.as_str(), status.as_str(), error_message, now],
        )?;
        tx.commit()?;
        drop(guard);
        Ok(())
    }

    /// Reads the latest status row for `key`.
    fn fetch_status(&self, key: &JobKey) -> Result<Option<JobRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT job_key, status, error_message, updated_at FROM map_jobs WHERE job_key \
                 = ?1",
                params![key.as_str()],
                raw_job_row,
            )
            .optional()?;
        drop(guard);
        row.map(RawJobRow::into_record).transpose()
    }
}

impl JobStatusStore for SqliteJobStore {
    fn update_status(
        &self,
        key: &JobKey,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.write_status(key, status, error_message).map_err(StoreError::from)
    }

    fn read_status(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        self.fetch_status(key).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .query_row("SELECT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Job row as stored, before status label validation.
struct RawJobRow {
    /// Job key column.
    key: String,
    /// Status label column.
    status: String,
    /// Optional failure description.
    error_message: Option<String>,
    /// Last update time (unix ms).
    updated_at: i64,
}

impl RawJobRow {
    /// Converts the stored row into a [`JobRecord`].
    fn into_record(self) -> Result<JobRecord, SqliteStoreError> {
        Ok(JobRecord {
            key: JobKey::new(self.key),
            status: parse_status(&self.status)?,
            error_message: self.error_message,
            updated_at_ms: self.updated_at,
        })
    }
}

/// Maps a `map_jobs` row into a [`RawJobRow`].
fn raw_job_row(row: &Row<'_>) -> rusqlite::Result<RawJobRow> {
    Ok(RawJobRow {
        key: row.get(0)?,
        status: row.get(1)?,
        error_message: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Parses a stored status label.
fn parse_status(label: &str) -> Result<JobStatus, SqliteStoreError> {
    JobStatus::parse(label)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown job status: {label}")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects empty or overlong job keys.
fn validate_job_key(key: &JobKey) -> Result<(), SqliteStoreError> {
    let value = key.as_str();
    if value.is_empty() {
        return Err(SqliteStoreError::Invalid("job key must be non-empty".to_string()));
    }
    if value.len() > MAX_JOB_KEY_LENGTH {
        return Err(SqliteStoreError::Invalid("job key exceeds length limit".to_string()));
    }
    Ok(())
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must be non-empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS map_jobs (
                    job_key TEXT PRIMARY KEY,
                    status TEXT NOT NULL,
                    error_message TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS map_job_events (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_key TEXT NOT NULL,
                    status TEXT NOT NULL,
                    error_message TEXT,
                    recorded_at INTEGER NOT NULL,
                    FOREIGN KEY (job_key) REFERENCES map_jobs(job_key)
                );
                CREATE INDEX IF NOT EXISTS idx_map_job_events_job_key
                    ON map_job_events (job_key);",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
