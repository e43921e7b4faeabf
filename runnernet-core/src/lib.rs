//! runnernet Core
//!
//! Provisioning sequencer for private networking of hosted runners: a fixed,
//! fail-fast list of control-plane calls guarded by live existence checks.

pub mod config;
pub mod control_plane;
pub mod guard;
pub mod memory;
pub mod plan;
pub mod resource;
pub mod sequencer;
pub mod step;
pub mod template;
