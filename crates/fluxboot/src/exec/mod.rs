//! Subprocess adapters for the external control binaries.

pub mod flux_cli;
pub mod kubectl;

pub use flux_cli::FluxCli;
pub use kubectl::Kubectl;
