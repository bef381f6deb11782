//! Orchestrator - drives analysis runs
//!
//! # Module Structure
//!
//! - `config`: `OrchestratorConfig`
//! - `core`: `Orchestrator` struct, builders and operational queries
//! - `process`: the supervisor / executor / replanner loop and finalisation
//! - `handle`: `RunHandle` and `RunReport`

mod config;
mod core;
mod handle;
mod process;


pub use config::OrchestratorConfig;
pub use core::Orchestrator;
pub use handle::{RunHandle, RunReport};
