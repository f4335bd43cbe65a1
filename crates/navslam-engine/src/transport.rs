// crates/navslam-engine/src/transport.rs
// ============================================================================
// Module: Engine Transport
// Description: Direct vs. managed-container engine execution.
// Purpose: Resolve engine programs and rewrite paths for the container.
// Dependencies: navslam-config
// ============================================================================

//! ## Overview
//! The engine either runs from a local install ([`EngineTransport::Direct`])
//! or inside an already-running named container reached through a container
//! runtime ([`EngineTransport::Managed`]). In managed mode host paths under
//! the data directory are rewritten to the container's mount point before
//! they are placed on the command line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use navslam_config::EngineConfig;

// ============================================================================
// SECTION: Transport
// ============================================================================

/// How the external engine is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineTransport {
    /// Programs run on the host.
    Direct {
        /// Install directory; programs are looked up in `<dir>/bin` first.
        install_dir: PathBuf,
    },
    /// Programs run inside a named container.
    Managed {
        /// Container name.
        container: String,
        /// Container runtime binary (e.g. `docker`).
        runtime: String,
        /// Host data directory mounted into the container.
        host_data_root: PathBuf,
        /// Mount point of the data directory inside the container.
        container_data_root: PathBuf,
    },
}

impl EngineTransport {
    /// Builds the transport from engine configuration.
    ///
    /// `data_dir` is the host directory that the container mounts.
    #[must_use]
    pub fn from_config(engine: &EngineConfig, data_dir: &Path) -> Self {
        match engine.container_name() {
            Some(container) => Self::Managed {
                container: container.to_string(),
                runtime: engine.container_runtime.trim().to_string(),
                host_data_root: data_dir.to_path_buf(),
                container_data_root: engine.container_data_root.clone(),
            },
            None => Self::Direct {
                install_dir: PathBuf::from(engine.path.trim()),
            },
        }
    }

    /// Returns true for the managed-container transport.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        matches!(self, Self::Managed { .. })
    }

    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Managed { .. } => "managed",
        }
    }

    /// Rewrites a host path into the path the engine sees.
    ///
    /// Direct mode and paths outside the data directory are returned as is.
    #[must_use]
    pub fn engine_path(&self, host_path: &Path) -> PathBuf {
        match self {
            Self::Direct { .. } => host_path.to_path_buf(),
            Self::Managed {
                host_data_root,
                container_data_root,
                ..
            } => host_path.strip_prefix(host_data_root).map_or_else(
                |_| host_path.to_path_buf(),
                |relative| container_data_root.join(relative),
            ),
        }
    }

    /// Resolves the executable for a direct invocation of `program`.
    ///
    /// Falls back to the bare program name so `PATH` lookup applies.
    #[must_use]
    pub fn direct_program(&self, program: &str) -> PathBuf {
        if let Self::Direct { install_dir } = self {
            for candidate in [install_dir.join("bin").join(program), install_dir.join(program)] {
                if candidate.is_file() {
                    return candidate;
                }
            }
        }
        PathBuf::from(program)
    }
}
