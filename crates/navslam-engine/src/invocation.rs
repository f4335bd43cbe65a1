// crates/navslam-engine/src/invocation.rs
// ============================================================================
// Module: Engine Invocations
// Description: Argument shapes for the reprocess, console, and export programs.
// Purpose: Translate engine calls into direct argv or one managed shell command.
// Dependencies: navslam-core, navslam-config
// ============================================================================

//! ## Overview
//! An [`EngineInvocation`] is transport-neutral: it names the engine program,
//! the operation kind (which selects the timeout budget), and a list of
//! arguments in which paths stay typed. [`EngineInvocation::command_line`]
//! renders it for a transport: direct mode yields an argument vector, managed
//! mode rewrites paths to the container mount and joins everything into a
//! single quoted shell command run through the container runtime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use navslam_config::TimeoutConfig;
use navslam_core::ParameterSet;

use crate::transport::EngineTransport;

// ============================================================================
// SECTION: Operation Kinds
// ============================================================================

/// Operation class; each has its own timeout budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Map build (reprocess); long budget.
    Build,
    /// Localization query (console); short interactive budget.
    Localize,
    /// Point-cloud export.
    Export,
}

impl OperationKind {
    /// Returns the operation label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Localize => "localize",
            Self::Export => "export",
        }
    }

    /// Returns the configured budget for this operation.
    #[must_use]
    pub const fn budget(self, timeouts: &TimeoutConfig) -> Duration {
        match self {
            Self::Build => timeouts.build(),
            Self::Localize => timeouts.localize(),
            Self::Export => timeouts.export(),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Programs and Arguments
// ============================================================================

/// Engine executables the service drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineProgram {
    /// Offline reprocessing with odometry.
    Reprocess,
    /// Console runner used for localization.
    Console,
    /// Dense point-cloud exporter.
    Export,
}

impl EngineProgram {
    /// Returns the executable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reprocess => "rtabmap-reprocess",
            Self::Console => "rtabmap-console",
            Self::Export => "rtabmap-export",
        }
    }
}

/// One engine argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineArg {
    /// Literal flag or value.
    Flag(String),
    /// File path, rewritten for the container in managed mode.
    Path(PathBuf),
    /// Directory path, rendered with a trailing `/`.
    Dir(PathBuf),
}

impl EngineArg {
    /// Builds a literal argument.
    fn flag(value: impl Into<String>) -> Self {
        Self::Flag(value.into())
    }

    /// Renders the argument for `transport`.
    fn render(&self, transport: &EngineTransport) -> String {
        match self {
            Self::Flag(value) => value.clone(),
            Self::Path(path) => transport.engine_path(path).to_string_lossy().into_owned(),
            Self::Dir(path) => {
                let mut rendered = transport.engine_path(path).to_string_lossy().into_owned();
                if !rendered.ends_with('/') {
                    rendered.push('/');
                }
                rendered
            }
        }
    }
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

/// Transport-neutral engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    /// Program to run.
    program: EngineProgram,
    /// Operation kind selecting the budget.
    operation: OperationKind,
    /// Arguments after the program name.
    args: Vec<EngineArg>,
}

impl EngineInvocation {
    /// Reprocess call: `rtabmap-reprocess -odom <params> <input> <output>`.
    #[must_use]
    pub fn reprocess(input: &Path, output: &Path, parameters: &ParameterSet) -> Self {
        let mut args = vec![EngineArg::flag("-odom")];
        args.extend(parameters.to_cli_args().into_iter().map(EngineArg::Flag));
        args.push(EngineArg::Path(input.to_path_buf()));
        args.push(EngineArg::Path(output.to_path_buf()));
        Self {
            program: EngineProgram::Reprocess,
            operation: OperationKind::Build,
            args,
        }
    }

    /// Console call: `rtabmap-console <params> -input <map> <images_dir>`.
    #[must_use]
    pub fn console(map: &Path, images_dir: &Path, parameters: &ParameterSet) -> Self {
        let mut args: Vec<EngineArg> =
            parameters.to_cli_args().into_iter().map(EngineArg::Flag).collect();
        args.push(EngineArg::flag("-input"));
        args.push(EngineArg::Path(map.to_path_buf()));
        args.push(EngineArg::Path(images_dir.to_path_buf()));
        Self {
            program: EngineProgram::Console,
            operation: OperationKind::Localize,
            args,
        }
    }

    /// Export call: `rtabmap-export --cloud --opt 3 --output_dir <dir>/ <db>`.
    #[must_use]
    pub fn export(database: &Path, output_dir: &Path) -> Self {
        Self {
            program: EngineProgram::Export,
            operation: OperationKind::Export,
            args: vec![
                EngineArg::flag("--cloud"),
                EngineArg::flag("--opt"),
                EngineArg::flag("3"),
                EngineArg::flag("--output_dir"),
                EngineArg::Dir(output_dir.to_path_buf()),
                EngineArg::Path(database.to_path_buf()),
            ],
        }
    }

    /// Returns the program.
    #[must_use]
    pub const fn program(&self) -> EngineProgram {
        self.program
    }

    /// Returns the operation kind.
    #[must_use]
    pub const fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Returns the typed arguments.
    #[must_use]
    pub fn args(&self) -> &[EngineArg] {
        &self.args
    }

    /// Renders the process to spawn for `transport`.
    #[must_use]
    pub fn command_line(&self, transport: &EngineTransport) -> CommandLine {
        let rendered: Vec<String> = self.args.iter().map(|arg| arg.render(transport)).collect();
        match transport {
            EngineTransport::Direct { .. } => CommandLine {
                program: transport.direct_program(self.program.name()),
                args: rendered,
            },
            EngineTransport::Managed {
                container,
                runtime,
                ..
            } => {
                let mut words = Vec::with_capacity(rendered.len() + 1);
                words.push(shell_quote(self.program.name()));
                words.extend(rendered.iter().map(|arg| shell_quote(arg)));
                CommandLine {
                    program: PathBuf::from(runtime),
                    args: vec![
                        "exec".to_string(),
                        container.clone(),
                        "bash".to_string(),
                        "-c".to_string(),
                        words.join(" "),
                    ],
                }
            }
        }
    }

    /// Returns the command that kills this program inside the container.
    ///
    /// Direct invocations are killed through the child handle instead.
    #[must_use]
    pub fn kill_command(&self, transport: &EngineTransport) -> Option<CommandLine> {
        match transport {
            EngineTransport::Direct { .. } => None,
            EngineTransport::Managed {
                container,
                runtime,
                ..
            } => Some(CommandLine {
                program: PathBuf::from(runtime),
                args: vec![
                    "exec".to_string(),
                    container.clone(),
                    "pkill".to_string(),
                    "-9".to_string(),
                    "-f".to_string(),
                    self.program.name().to_string(),
                ],
            }),
        }
    }
}

// ============================================================================
// SECTION: Command Line
// ============================================================================

/// Concrete process to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Builds a command line from parts.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Quotes `word` for `bash -c` unless it only has shell-safe characters.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}
