//! Top-level orchestration loop

mod core;

pub use core::{Orchestrator, OrchestratorDeps, OrchestratorStatus, ProjectOutcome};
