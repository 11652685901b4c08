//! Snapshot and cooldown row types

use serde::{Deserialize, Serialize};

use crate::{generate_id, now_ms};

/// Running sentinel statistics captured in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SentinelStats {
    /// Total verifications performed
    pub verification_count: u64,

    /// Automatic vetoes issued
    pub veto_count: u64,

    /// Mean quality score across verifications
    pub average_quality_score: f64,
}

/// Agent/process state captured at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentState {
    /// Excerpt of the actor's working memory
    pub actor_memory: String,

    /// Sentinel running totals
    pub sentinel_stats: SentinelStats,

    /// Task being driven when the snapshot was taken
    pub current_task_id: Option<String>,

    /// Progress through the current task, 0-100
    pub task_progress: u8,

    /// Actor iterations consumed on the current task
    pub iteration_count: u32,

    /// Id of the most recent sentinel verdict, if any
    pub last_verdict_id: Option<String>,
}

/// A durable capture of enough state to resume after a crash or cooldown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Unique identifier
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Git hash of the project tree at snapshot time
    pub git_hash: String,

    /// Agent state owned exclusively by this snapshot
    pub agent_state: AgentState,

    /// Recent assistant messages, oldest first
    pub reasoning_trace: Vec<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl StateSnapshot {
    /// Create a snapshot for a project at a given git hash
    pub fn new(project_id: impl Into<String>, git_hash: impl Into<String>, agent_state: AgentState) -> Self {
        Self {
            id: generate_id("snap"),
            project_id: project_id.into(),
            git_hash: git_hash.into(),
            agent_state,
            reasoning_trace: Vec::new(),
            created_at: now_ms(),
        }
    }

    /// A snapshot is a healthy recovery point when the sentinel saw no vetoes
    /// or the average quality stayed at or above 85
    pub fn is_healthy(&self) -> bool {
        let stats = &self.agent_state.sentinel_stats;
        stats.veto_count == 0 || stats.average_quality_score >= 85.0
    }
}

/// A persisted wait-until record for a rate-limited provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cooldown {
    /// Unique identifier
    pub id: String,

    /// Provider name, e.g. `openai`
    pub provider: String,

    /// When the cooldown was entered (Unix milliseconds)
    pub started_at: i64,

    /// When dispatch may resume (Unix milliseconds)
    pub resume_at: i64,

    /// Snapshot taken on entry; the resume point
    pub snapshot_id: Option<String>,

    /// Why the cooldown was entered
    pub reason: String,
}

impl Cooldown {
    /// Create a cooldown starting now
    pub fn new(provider: impl Into<String>, resume_at: i64, reason: impl Into<String>) -> Self {
        Self {
            id: generate_id("cd"),
            provider: provider.into(),
            started_at: now_ms(),
            resume_at,
            snapshot_id: None,
            reason: reason.into(),
        }
    }

    /// Whether the cooldown is still blocking dispatch at `now`
    pub fn is_active(&self, now: i64) -> bool {
        self.resume_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_healthy_no_vetoes() {
        let state = AgentState {
            sentinel_stats: SentinelStats {
                verification_count: 4,
                veto_count: 0,
                average_quality_score: 70.0,
            },
            ..Default::default()
        };
        assert!(StateSnapshot::new("proj-1", "abc123", state).is_healthy());
    }

    #[test]
    fn test_snapshot_healthy_high_average() {
        let state = AgentState {
            sentinel_stats: SentinelStats {
                verification_count: 4,
                veto_count: 2,
                average_quality_score: 90.0,
            },
            ..Default::default()
        };
        assert!(StateSnapshot::new("proj-1", "abc123", state).is_healthy());
    }

    #[test]
    fn test_snapshot_unhealthy() {
        let state = AgentState {
            sentinel_stats: SentinelStats {
                verification_count: 4,
                veto_count: 1,
                average_quality_score: 60.0,
            },
            ..Default::default()
        };
        assert!(!StateSnapshot::new("proj-1", "abc123", state).is_healthy());
    }

    #[test]
    fn test_cooldown_active_window() {
        let cd = Cooldown::new("openai", now_ms() + 60_000, "429");
        assert!(cd.is_active(now_ms()));
        assert!(!cd.is_active(cd.resume_at + 1));
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let mut snap = StateSnapshot::new("proj-1", "deadbeef", AgentState::default());
        snap.reasoning_trace.push("considered adding tests".to_string());

        let json = serde_json::to_string(&snap).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }
}
