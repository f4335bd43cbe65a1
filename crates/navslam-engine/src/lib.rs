// crates/navslam-engine/src/lib.rs
// ============================================================================
// Module: navslam Engine Library
// Description: External SLAM engine supervision and map job orchestration.
// Purpose: Run the engine safely and sequence map builds through one worker.
// Dependencies: navslam-core, navslam-config, tokio, async-trait
// ============================================================================

//! ## Overview
//! This crate owns everything that touches the external SLAM engine process:
//! the transport selection (direct or managed container), the argument shapes
//! of each engine program, the process supervisor with per-operation
//! timeouts, the build and localization pipelines, the on-disk map directory,
//! and the single-worker job queue that serializes map builds.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod errors;
pub mod invocation;
pub mod localize;
pub mod maps;
pub mod pipeline;
pub mod queue;
pub mod supervisor;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use errors::EngineError;
pub use invocation::CommandLine;
pub use invocation::EngineArg;
pub use invocation::EngineInvocation;
pub use invocation::EngineProgram;
pub use invocation::OperationKind;
pub use localize::Localization;
pub use localize::Localizer;
pub use maps::MapArchive;
pub use maps::MapDirectory;
pub use maps::MapListing;
pub use maps::MapMetadata;
pub use pipeline::BuildOutcome;
pub use pipeline::BuildTask;
pub use pipeline::MapBuildPipeline;
pub use pipeline::MapBuilder;
pub use queue::JobQueue;
pub use queue::JobTicket;
pub use queue::QueueError;
pub use queue::RetryPolicy;
pub use supervisor::EngineOutput;
pub use supervisor::ProcessSupervisor;
pub use supervisor::ProgressTracker;
pub use supervisor::SupervisorError;
pub use supervisor::supervise;
pub use transport::EngineTransport;
