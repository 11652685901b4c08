//! The per-task verification loop
//!
//! Drives one task to a passing verdict or a lock: Actor attempt, Sentinel
//! veto pre-check, full verification, revert-on-fail, retry up to a bound.

mod confidence;
mod engine;

pub use confidence::{Confidence, calculate_confidence};
pub use engine::{AgentLoop, AgentLoopResult, rolling_diff_hash};
