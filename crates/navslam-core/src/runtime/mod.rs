// crates/navslam-core/src/runtime/mod.rs
// ============================================================================
// Module: navslam Runtime Helpers
// Description: In-process implementations of the core interfaces.
// Purpose: Provide deterministic stores for tests and local tooling.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime helpers implement the core interfaces without external storage.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::InMemoryJobStore;
