// crates/navslam-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and `navslam config example`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `navslam.toml`. Every value shown is the default unless
//! the comment beside it says otherwise; the example always validates.

/// Returns a canonical example `navslam.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[engine]
path = "docker://rtabmap"
container_runtime = "docker"
container_data_root = "/data"
# Local install instead of a container:
# path = "/opt/rtabmap"

[timeouts]
build_secs = 600
localize_secs = 30
export_secs = 120

[storage]
data_dir = "data"

[map]
selection = "dynamic"
# selection = "fixed"
# fixed_map_id = "260202-202240"

[params]
# Overrides merged over the default engine parameter table.
"Kp/MaxFeatures" = "1000"
"Vis/MinInliers" = "3"

[jobs]
store_path = "data/jobs.db"
retry_attempts = 3
retry_base_ms = 100
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"

[logging]
level = "info"
"#,
    )
}
