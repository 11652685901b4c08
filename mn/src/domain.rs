//! Domain types for Midnight
//!
//! The durable row types live in the queuestore crate; this module
//! re-exports them for convenience alongside the store itself.

pub use queuestore::{
    AgentState, AssignedAgent, AuditLog, Cooldown, LogEntry, NewTask, Project, ProjectDna, ProjectStatus, QueueStats,
    SentinelStats, SentinelVerdict, StateSnapshot, Store, StoreError, Task, TaskArtifact, TaskError, TaskMetrics,
    TaskPatch, TaskResult, TaskStatus, Traceability, now_ms,
};
