// crates/navslam-engine/src/supervisor.rs
// ============================================================================
// Module: Process Supervisor
// Description: Spawns engine processes with hard timeouts and output draining.
// Purpose: Never deadlock on pipes, never leak a process past its budget.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! [`supervise`] runs one child process through
//! `Idle -> Launching -> Running -> {Completed | TimedOut | Failed}`. The
//! stdout drain, the stderr drain and the exit wait are joined concurrently
//! and the join races a timer holding the operation's budget. When the timer
//! wins the child is killed (and, for managed execution, the program is
//! killed by name inside the container) before `Timeout` is returned.
//!
//! Once the child exits, the drains get a short grace period; a pipe held
//! open by a detached grandchild does not turn a finished run into a timeout.
//!
//! Children are spawned with kill-on-drop, so dropping an in-flight
//! supervision future also terminates the process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitStatus;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use navslam_config::TimeoutConfig;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::invocation::CommandLine;
use crate::invocation::EngineInvocation;
use crate::invocation::OperationKind;
use crate::transport::EngineTransport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum bytes of each stream kept in memory; the rest is still drained.
const MAX_CAPTURE_BYTES: usize = 8 * 1024 * 1024;
/// How long output may stay open after the child exits.
const DRAIN_GRACE: Duration = Duration::from_secs(2);
/// Budget for the in-container kill command.
const KILL_COMMAND_BUDGET: Duration = Duration::from_secs(5);
/// Exit code reported when the child was ended by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;
/// Output markers counted as build progress.
const PROGRESS_MARKERS: &[&str] = &["Processing image", "Odom"];
/// Percent reported before the first marker.
const PROGRESS_FLOOR: u64 = 30;
/// Percent range covered by the markers.
const PROGRESS_SPAN: u64 = 55;
/// Highest percent the markers can reach.
const PROGRESS_CEILING: u64 = 85;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine process failures.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Process could not be started.
    #[error("failed to launch {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Launch error.
        message: String,
    },
    /// Process exceeded its budget and was killed.
    #[error("{operation} timed out after {}s", .budget.as_secs())]
    Timeout {
        /// Operation that timed out.
        operation: OperationKind,
        /// Budget that was exceeded.
        budget: Duration,
    },
    /// Process exited unsuccessfully.
    #[error("{operation} engine exited with code {code}: {stderr}")]
    EngineFailure {
        /// Operation that failed.
        operation: OperationKind,
        /// Exit code, or [`SIGNAL_EXIT_CODE`] when killed by a signal.
        code: i32,
        /// Captured stderr text.
        stderr: String,
    },
    /// Pipe or wait failure while the process was running.
    #[error("engine io error: {0}")]
    Io(String),
}

impl SupervisorError {
    /// Returns true when the budget was exceeded.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Captured result of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    /// Captured stdout, one `\n`-terminated line per output line.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Exit code (always 0 for a returned output).
    pub code: i32,
    /// Wall-clock run time.
    pub elapsed: Duration,
}

/// Invocation lifecycle states, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Not yet started.
    Idle,
    /// Spawning the process.
    Launching,
    /// Process running, output draining.
    Running,
    /// Exited with status 0.
    Completed,
    /// Budget exceeded; process killed.
    TimedOut,
    /// Exited non-zero or failed to launch.
    Failed,
}

impl InvocationState {
    /// Returns the state label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Runs engine invocations over one transport with configured budgets.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    /// Engine transport.
    transport: EngineTransport,
    /// Per-operation budgets.
    timeouts: TimeoutConfig,
}

impl ProcessSupervisor {
    /// Creates a supervisor.
    #[must_use]
    pub const fn new(transport: EngineTransport, timeouts: TimeoutConfig) -> Self {
        Self {
            transport,
            timeouts,
        }
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &EngineTransport {
        &self.transport
    }

    /// Returns the budget for `operation`.
    #[must_use]
    pub const fn budget(&self, operation: OperationKind) -> Duration {
        operation.budget(&self.timeouts)
    }

    /// Runs `invocation` under its operation budget.
    ///
    /// `on_line` receives each stdout line as it is produced.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] on launch failure, timeout, or non-zero
    /// exit.
    pub async fn run(
        &self,
        invocation: &EngineInvocation,
        on_line: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<EngineOutput, SupervisorError> {
        let command = invocation.command_line(&self.transport);
        let kill_command = invocation.kill_command(&self.transport);
        let operation = invocation.operation();
        info!(
            operation = operation.as_str(),
            transport = self.transport.label(),
            program = invocation.program().name(),
            "starting engine"
        );
        supervise(&command, operation, self.budget(operation), kill_command.as_ref(), on_line).await
    }
}

/// Runs `command` to completion or until `budget` elapses.
///
/// Stdout and stderr are drained concurrently with the exit wait. On timeout
/// `kill_command` (if any) runs first, then the child is killed and reaped.
///
/// # Errors
///
/// Returns [`SupervisorError::Spawn`] when the process cannot start,
/// [`SupervisorError::Timeout`] when the budget elapses, and
/// [`SupervisorError::EngineFailure`] on a non-zero exit.
pub async fn supervise(
    command: &CommandLine,
    operation: OperationKind,
    budget: Duration,
    kill_command: Option<&CommandLine>,
    mut on_line: Option<&mut (dyn FnMut(&str) + Send)>,
) -> Result<EngineOutput, SupervisorError> {
    let started = Instant::now();
    record_state(operation, InvocationState::Idle);
    record_state(operation, InvocationState::Launching);
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            record_state(operation, InvocationState::Failed);
            SupervisorError::Spawn {
                program: command.program.display().to_string(),
                message: err.to_string(),
            }
        })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SupervisorError::Io("stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SupervisorError::Io("stderr was not captured".to_string()))?;
    record_state(operation, InvocationState::Running);

    let run = async {
        let mut stdout_text = String::new();
        let mut stderr_text = String::new();
        let status = {
            let drains = async {
                tokio::try_join!(
                    drain(stdout, "stdout", on_line.as_deref_mut(), &mut stdout_text),
                    drain(stderr, "stderr", None, &mut stderr_text),
                )
            };
            tokio::pin!(drains);
            let mut drained = false;
            let status = loop {
                tokio::select! {
                    result = &mut drains, if !drained => {
                        result.map_err(|err| SupervisorError::Io(err.to_string()))?;
                        drained = true;
                    }
                    status = child.wait() => {
                        break status.map_err(|err| SupervisorError::Io(err.to_string()))?;
                    }
                }
            };
            if !drained {
                match tokio::time::timeout(DRAIN_GRACE, &mut drains).await {
                    Ok(result) => {
                        result.map_err(|err| SupervisorError::Io(err.to_string()))?;
                    }
                    Err(_) => warn!(
                        operation = operation.as_str(),
                        "engine output still open after exit; remaining output dropped"
                    ),
                }
            }
            status
        };
        Ok::<(ExitStatus, String, String), SupervisorError>((status, stdout_text, stderr_text))
    };
    let outcome = tokio::time::timeout(budget, run).await;

    let Ok(result) = outcome else {
        record_state(operation, InvocationState::TimedOut);
        terminate(&mut child, kill_command).await;
        warn!(operation = operation.as_str(), budget_secs = budget.as_secs(), "engine timed out");
        return Err(SupervisorError::Timeout {
            operation,
            budget,
        });
    };
    let (status, stdout, stderr) = result?;
    let code = status.code().unwrap_or(SIGNAL_EXIT_CODE);
    if !status.success() {
        record_state(operation, InvocationState::Failed);
        return Err(SupervisorError::EngineFailure {
            operation,
            code,
            stderr,
        });
    }
    record_state(operation, InvocationState::Completed);
    Ok(EngineOutput {
        stdout,
        stderr,
        code,
        elapsed: started.elapsed(),
    })
}

// ============================================================================
// SECTION: Progress
// ============================================================================

/// Derives a build percentage from progress markers in engine output.
///
/// Reports stay within `30..=85` and never decrease. The markers depend on the
/// engine's log wording, so the value is telemetry only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    /// Expected number of markers (frames).
    expected: usize,
    /// Markers seen so far.
    seen: usize,
    /// Last reported percent.
    last: Option<u8>,
}

impl ProgressTracker {
    /// Creates a tracker expecting `expected` frames.
    #[must_use]
    pub const fn new(expected: usize) -> Self {
        Self {
            expected,
            seen: 0,
            last: None,
        }
    }

    /// Returns the number of markers seen.
    #[must_use]
    pub const fn seen(&self) -> usize {
        self.seen
    }

    /// Feeds one output line; returns a new percent when it increased.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        if self.expected == 0 || !PROGRESS_MARKERS.iter().any(|marker| line.contains(marker)) {
            return None;
        }
        self.seen = self.seen.saturating_add(1);
        let seen = u64::try_from(self.seen).unwrap_or(u64::MAX);
        let expected = u64::try_from(self.expected).unwrap_or(u64::MAX);
        let percent =
            (PROGRESS_FLOOR + seen.saturating_mul(PROGRESS_SPAN) / expected).min(PROGRESS_CEILING);
        let percent = u8::try_from(percent).unwrap_or(u8::MAX);
        if self.last.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads `reader` line by line until EOF into `captured`, up to the byte cap.
async fn drain<R>(
    reader: R,
    stream: &'static str,
    mut on_line: Option<&mut (dyn FnMut(&str) + Send + '_)>,
    captured: &mut String,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buffer);
        let line = text.trim_end_matches(['\n', '\r']);
        debug!(stream, line, "engine output");
        if let Some(handler) = on_line.as_deref_mut() {
            handler(line);
        }
        if captured.len() + line.len() < MAX_CAPTURE_BYTES {
            captured.push_str(line);
            captured.push('\n');
        }
    }
    Ok(())
}

/// Kills a timed-out child, first by name inside the container if managed.
async fn terminate(child: &mut Child, kill_command: Option<&CommandLine>) {
    if let Some(kill) = kill_command {
        let status = Command::new(&kill.program)
            .args(&kill.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        match tokio::time::timeout(KILL_COMMAND_BUDGET, status).await {
            Ok(Ok(status)) => debug!(code = status.code(), "container kill command finished"),
            Ok(Err(err)) => warn!(error = %err, "container kill command failed"),
            Err(_) => warn!("container kill command timed out"),
        }
    }
    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill engine process");
    }
}

/// Records a lifecycle transition.
fn record_state(operation: OperationKind, state: InvocationState) {
    debug!(operation = operation.as_str(), state = state.as_str(), "engine invocation state");
}
