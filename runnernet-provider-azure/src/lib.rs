//! runnernet Azure Provider
//!
//! ControlPlane implementation that drives the Azure CLI (`az`).
//!
//! ## Module Structure
//!
//! - `commands` - Argument lists for each `az` call, plus cleanup rendering
//! - `errors` - Classification of CLI failures
//! - `provider` - AzureCliControlPlane implementation
//! - `runner` - Process seam around the `az` executable

pub mod commands;
pub mod errors;
pub mod provider;
pub mod runner;

// Re-export main types
pub use commands::cleanup_commands;
pub use provider::AzureCliControlPlane;
pub use runner::{AzCommandRunner, CommandOutput, CommandRunner};
