//! QueueStore - durable project queue and task store
//!
//! The single source of truth for the orchestrator: queued projects, their
//! DNA, the tasks derived from them, state snapshots, sentinel verdicts,
//! provider cooldowns, and the structured execution log. Backed by SQLite
//! with every write durable before the call returns.
//!
//! All other components hold only ids and read/write through [`Store`].
//! The store serializes writes internally, so a shared `Arc<Store>` is the
//! expected ownership model.

pub mod error;
pub mod project;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod task;
pub mod verdict;

pub use error::StoreError;
pub use project::{Project, ProjectDna, ProjectStatus};
pub use snapshot::{AgentState, Cooldown, SentinelStats, StateSnapshot};
pub use store::{LogEntry, NewTask, QueueStats, Store, TaskPatch};
pub use task::{AssignedAgent, Task, TaskArtifact, TaskError, TaskMetrics, TaskResult, TaskStatus};
pub use verdict::{AuditLog, SentinelVerdict, Traceability};

/// Current time as integer milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a prefixed, time-ordered identifier (e.g. `task-018f...`)
pub fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_positive() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn test_generate_id_prefix() {
        let id = generate_id("proj");
        assert!(id.starts_with("proj-"));
        assert!(id.len() > 10);
    }

    #[test]
    fn test_generate_id_unique() {
        assert_ne!(generate_id("task"), generate_id("task"));
    }
}
