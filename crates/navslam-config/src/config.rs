// crates/navslam-config/src/config.rs
// ============================================================================
// Module: navslam Configuration
// Description: Configuration loading and validation for navslam.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: navslam-core, navslam-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is a complete configuration.
//! Invalid values fail closed at load time rather than at first use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use navslam_core::ParameterSet;
use navslam_store_sqlite::SqliteStoreConfig;
use navslam_store_sqlite::SqliteStoreMode;
use navslam_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "navslam.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "NAVSLAM_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Prefix selecting the managed-container engine transport.
pub const MANAGED_ENGINE_PREFIX: &str = "docker://";
/// Default engine location.
const DEFAULT_ENGINE_PATH: &str = "docker://rtabmap";
/// Default container runtime binary.
const DEFAULT_CONTAINER_RUNTIME: &str = "docker";
/// Default data mount point inside the engine container.
const DEFAULT_CONTAINER_DATA_ROOT: &str = "/data";
/// Default map-build budget in seconds.
const DEFAULT_BUILD_SECS: u64 = 600;
/// Default localization budget in seconds.
const DEFAULT_LOCALIZE_SECS: u64 = 30;
/// Default point-cloud export budget in seconds.
const DEFAULT_EXPORT_SECS: u64 = 120;
/// Default data directory.
const DEFAULT_DATA_DIR: &str = "data";
/// Default job store filename under the data directory.
const DEFAULT_JOB_STORE_NAME: &str = "jobs.db";
/// Default number of retries for durable status writes.
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default first backoff delay for durable status writes.
const DEFAULT_RETRY_BASE_MS: u64 = 100;
/// Maximum allowed retries for durable status writes.
const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Maximum allowed first backoff delay.
const MAX_RETRY_BASE_MS: u64 = 10_000;
/// Default busy timeout for the job store.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Accepted log levels.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// navslam service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NavslamConfig {
    /// External engine location and container settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Per-operation timeout budgets.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// On-disk data layout.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Fixed or dynamic map selection.
    #[serde(default)]
    pub map: MapSelectionConfig,
    /// Engine parameter overrides merged over the default table.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Job queue and durable store settings.
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NavslamConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is taken from `path`, else from `NAVSLAM_CONFIG`, else
    /// `navslam.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.timeouts.validate()?;
        self.storage.validate()?;
        self.map.validate()?;
        self.jobs.validate()?;
        self.logging.validate()?;
        self.parameter_set()?;
        Ok(())
    }

    /// Returns the default parameter table with `[params]` overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override key or value
    /// contains a parameter delimiter.
    pub fn parameter_set(&self) -> Result<ParameterSet, ConfigError> {
        let mut overrides = ParameterSet::new();
        for (key, value) in &self.params {
            overrides
                .insert(key.as_str(), value.as_str())
                .map_err(|err| ConfigError::Invalid(format!("params: {err}")))?;
        }
        let mut parameters = ParameterSet::defaults();
        parameters.merge(&overrides);
        Ok(parameters)
    }

    /// Returns the map id to use for a request.
    #[must_use]
    pub fn resolve_map_id<'a>(&'a self, requested: &'a str) -> &'a str {
        self.map.resolve(requested)
    }

    /// Returns the directory holding capture sessions.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.storage.data_dir.join("sessions")
    }

    /// Returns the directory holding persisted maps.
    #[must_use]
    pub fn maps_dir(&self) -> PathBuf {
        self.storage.data_dir.join("maps")
    }

    /// Returns the `SQLite` job store configuration.
    #[must_use]
    pub fn job_store_config(&self) -> SqliteStoreConfig {
        let path = self
            .jobs
            .store_path
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join(DEFAULT_JOB_STORE_NAME));
        SqliteStoreConfig {
            path,
            busy_timeout_ms: self.jobs.busy_timeout_ms,
            journal_mode: self.jobs.journal_mode,
            sync_mode: self.jobs.sync_mode,
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// External engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Local install directory, or `docker://<container>` for managed mode.
    #[serde(default = "default_engine_path")]
    pub path: String,
    /// Container runtime binary used in managed mode.
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,
    /// Mount point of the host data directory inside the container.
    #[serde(default = "default_container_data_root")]
    pub container_data_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            container_runtime: default_container_runtime(),
            container_data_root: default_container_data_root(),
        }
    }
}

impl EngineConfig {
    /// Returns the container name when the managed transport is selected.
    #[must_use]
    pub fn container_name(&self) -> Option<&str> {
        self.path.trim().strip_prefix(MANAGED_ENGINE_PREFIX)
    }

    /// Validates engine configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let path = self.path.trim();
        if path.is_empty() {
            return Err(ConfigError::Invalid("engine.path must be non-empty".to_string()));
        }
        if let Some(container) = self.container_name() {
            if container.is_empty() {
                return Err(ConfigError::Invalid(
                    "engine.path docker:// requires a container name".to_string(),
                ));
            }
            if container.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "engine.path container name must not contain whitespace".to_string(),
                ));
            }
            if self.container_runtime.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "engine.container_runtime must be non-empty".to_string(),
                ));
            }
            if !self.container_data_root.is_absolute() {
                return Err(ConfigError::Invalid(
                    "engine.container_data_root must be absolute".to_string(),
                ));
            }
        } else {
            validate_path_string("engine.path", path)?;
        }
        Ok(())
    }
}

/// Returns the default engine location.
fn default_engine_path() -> String {
    DEFAULT_ENGINE_PATH.to_string()
}

/// Returns the default container runtime.
fn default_container_runtime() -> String {
    DEFAULT_CONTAINER_RUNTIME.to_string()
}

/// Returns the default container data mount point.
fn default_container_data_root() -> PathBuf {
    PathBuf::from(DEFAULT_CONTAINER_DATA_ROOT)
}

// ============================================================================
// SECTION: Timeouts
// ============================================================================

/// Per-operation wall-clock budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Map-build (reprocess) budget in seconds.
    #[serde(default = "default_build_secs")]
    pub build_secs: u64,
    /// Localization (console) budget in seconds.
    #[serde(default = "default_localize_secs")]
    pub localize_secs: u64,
    /// Point-cloud export budget in seconds.
    #[serde(default = "default_export_secs")]
    pub export_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            build_secs: DEFAULT_BUILD_SECS,
            localize_secs: DEFAULT_LOCALIZE_SECS,
            export_secs: DEFAULT_EXPORT_SECS,
        }
    }
}

impl TimeoutConfig {
    /// Returns the map-build budget.
    #[must_use]
    pub const fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    /// Returns the localization budget.
    #[must_use]
    pub const fn localize(&self) -> Duration {
        Duration::from_secs(self.localize_secs)
    }

    /// Returns the export budget.
    #[must_use]
    pub const fn export(&self) -> Duration {
        Duration::from_secs(self.export_secs)
    }

    /// Validates timeout budgets.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("timeouts.build_secs", self.build_secs),
            ("timeouts.localize_secs", self.localize_secs),
            ("timeouts.export_secs", self.export_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
            }
        }
        if self.localize_secs > self.build_secs {
            return Err(ConfigError::Invalid(
                "timeouts.localize_secs must not exceed timeouts.build_secs".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default map-build budget.
const fn default_build_secs() -> u64 {
    DEFAULT_BUILD_SECS
}

/// Returns the default localization budget.
const fn default_localize_secs() -> u64 {
    DEFAULT_LOCALIZE_SECS
}

/// Returns the default export budget.
const fn default_export_secs() -> u64 {
    DEFAULT_EXPORT_SECS
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// On-disk data layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root data directory; sessions and maps live beneath it.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Validates storage configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("storage.data_dir", &self.data_dir.to_string_lossy())
    }
}

/// Returns the default data directory.
fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

// ============================================================================
// SECTION: Map Selection
// ============================================================================

/// Map selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MapSelectionMode {
    /// Requests name the map they want.
    #[default]
    Dynamic,
    /// Every request is served from one configured map.
    Fixed,
}

/// Map selection configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapSelectionConfig {
    /// Selection mode.
    #[serde(default)]
    pub selection: MapSelectionMode,
    /// Map id served in fixed mode.
    #[serde(default)]
    pub fixed_map_id: Option<String>,
}

impl MapSelectionConfig {
    /// Returns the fixed id in fixed mode, else `requested`.
    #[must_use]
    pub fn resolve<'a>(&'a self, requested: &'a str) -> &'a str {
        match (self.selection, self.fixed_map_id.as_deref()) {
            (MapSelectionMode::Fixed, Some(fixed)) => fixed,
            _ => requested,
        }
    }

    /// Validates map selection configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.selection, self.fixed_map_id.as_deref()) {
            (MapSelectionMode::Fixed, None) => Err(ConfigError::Invalid(
                "map.selection = \"fixed\" requires map.fixed_map_id".to_string(),
            )),
            (_, Some(id)) => validate_map_id("map.fixed_map_id", id),
            (MapSelectionMode::Dynamic, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Jobs
// ============================================================================

/// Job queue and durable job store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// `SQLite` job store path; defaults to `<data_dir>/jobs.db`.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Retries after the first failed status write.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// First retry delay; later delays double.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Job store busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Job store journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Job store sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            busy_timeout_ms: DEFAULT_STORE_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl JobsConfig {
    /// Returns the first retry delay.
    #[must_use]
    pub const fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    /// Validates job configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "jobs.retry_attempts must be at most {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.retry_base_ms == 0 || self.retry_base_ms > MAX_RETRY_BASE_MS {
            return Err(ConfigError::Invalid(format!(
                "jobs.retry_base_ms must be between 1 and {MAX_RETRY_BASE_MS}"
            )));
        }
        if let Some(path) = &self.store_path {
            validate_path_string("jobs.store_path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Returns the default retry count.
const fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

/// Returns the default first retry delay.
const fn default_retry_base_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}

/// Returns the default job store busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Returns the default log level.
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a map id used as a file stem.
fn validate_map_id(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.len() > MAX_PATH_COMPONENT_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} must be 1..=255 characters")));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if !value.chars().all(allowed) || value.starts_with('.') {
        return Err(ConfigError::Invalid(format!(
            "{field} may only contain letters, digits, '-', '_' and '.'"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
