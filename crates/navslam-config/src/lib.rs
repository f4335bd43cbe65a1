// crates/navslam-config/src/lib.rs
// ============================================================================
// Module: navslam Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for navslam.toml semantics.
// Dependencies: navslam-core, navslam-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `navslam-config` defines the configuration model for the map-building
//! service: engine transport, per-operation timeouts, storage layout, map
//! selection, engine parameter overrides, the durable job store, and logging.
//! Validation is strict and fails closed; an empty file yields a valid
//! configuration built entirely from defaults.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
