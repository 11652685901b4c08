//! Midnight - autonomous software-build orchestrator
//!
//! Midnight consumes a queue of projects, each described by a three-file
//! specification (idea, tech stack, definition of done), and drives each
//! through loading, planning, building, verifying, and hand-off. Two
//! adversarial agents cooperate on every task: an **Actor** that edits code
//! and runs tools inside a sandbox, and a **Sentinel** that reviews each
//! diff read-only and either approves or vetoes it.
//!
//! # Core Concepts
//!
//! - **Durable everything**: projects, tasks, DNA, snapshots, verdicts, and
//!   cooldowns live in the SQLite-backed [`queuestore`]; a crashed process is
//!   recovered from the store and snapshots alone
//! - **Isolation per attempt**: every task attempt runs in a fresh git
//!   worktree; nothing reaches the parent tree without Sentinel approval
//! - **Numeric quality contract**: a verdict passes only when its score
//!   clears the configured threshold and no veto pattern fired
//! - **Snapshot and resume**: provider rate limits enter a persisted
//!   cooldown keyed to a snapshot, and the orchestrator resumes from it
//!
//! # Modules
//!
//! - [`orchestrator`] - top-level loop over projects and phases
//! - [`agents`] - the Actor and Sentinel
//! - [`r#loop`] - the per-task verification loop
//! - [`sandbox`] / [`tools`] - bounded tool execution
//! - [`state`] - snapshot engine and crash recovery
//! - [`events`] - the typed event stream

pub mod agents;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod events;
pub mod gitops;
pub mod handoff;
pub mod llm;
pub mod loader;
pub mod orchestrator;
pub mod phase;
pub mod prompts;
pub mod repomap;
pub mod sandbox;
pub mod state;
pub mod tools;
pub mod worktree;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use agents::{Actor, ActorContext, Sentinel, SentinelContext, check_veto_conditions};
pub use config::{AgentLoopConfig, Config, GatewayConfig, HandoffConfig, TrustLevel};
pub use events::{ConfidenceLevel, Event, EventBus, EventEmitter};
pub use handoff::{DeploymentTrigger, HandoffRunner};
pub use llm::{ChatClient, ChatRequest, ChatResponse, Effort, GatewayClient, LlmError};
pub use loader::{DnaFileLoader, ProjectLoader, TaskDefinition};
pub use orchestrator::{Orchestrator, OrchestratorDeps, OrchestratorStatus};
pub use phase::{Phase, PhaseMachine};
pub use r#loop::{AgentLoop, AgentLoopResult, Confidence, calculate_confidence};
pub use repomap::{FileListingRepoMap, RepoMapProvider};
pub use sandbox::{NativeSandbox, SandboxConfig, SandboxError, SandboxProvider};
pub use state::{RecoveryOptions, RecoveryResult, StateEngine, check_needs_recovery, recover};
pub use tools::{Tool, ToolContext, ToolExecutor, ToolResult};
pub use worktree::{WorktreeError, WorktreeManager};
