//! Event types for Midnight activity streaming
//!
//! A closed sum type: listeners pattern-match, and a new kind of activity
//! means a new variant, not a stringly-typed payload. The serialized form is
//! tagged with `type` for wire compatibility with the observer UI.

use serde::{Deserialize, Serialize};

/// Health classification derived from confidence scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Healthy,
    Warning,
    Error,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Core event enum - the vocabulary of Midnight's activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // === Project lifecycle ===
    ProjectStarted {
        project_id: String,
    },
    ProjectCompleted {
        project_id: String,
    },
    ProjectFailed {
        project_id: String,
        reason: String,
    },

    // === Task lifecycle ===
    TaskStarted {
        project_id: String,
        task_id: String,
    },
    TaskCompleted {
        project_id: String,
        task_id: String,
        quality_score: u8,
    },
    TaskFailed {
        project_id: String,
        task_id: String,
        reason: String,
    },
    TaskLocked {
        project_id: String,
        task_id: String,
        reason: String,
    },

    // === Sentinel ===
    SentinelVerdict {
        task_id: String,
        verdict_id: String,
        quality_score: u8,
        passed: bool,
    },
    SentinelVeto {
        task_id: String,
        directive: String,
    },

    // === Worktree ===
    WorktreeReverted {
        task_id: String,
        to_hash: String,
    },

    // === State engine ===
    SnapshotCreated {
        project_id: String,
        snapshot_id: String,
    },
    CooldownEntered {
        cooldown_id: String,
        provider: String,
        resume_at: i64,
    },
    CooldownExited {
        cooldown_id: String,
        provider: String,
    },

    // === Hand-off & confidence ===
    HandoffTriggered {
        from_project: String,
        to_project: String,
    },
    ConfidenceUpdated {
        project_id: String,
        score: u8,
        level: ConfidenceLevel,
    },
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ProjectStarted { .. } => "project_started",
            Event::ProjectCompleted { .. } => "project_completed",
            Event::ProjectFailed { .. } => "project_failed",
            Event::TaskStarted { .. } => "task_started",
            Event::TaskCompleted { .. } => "task_completed",
            Event::TaskFailed { .. } => "task_failed",
            Event::TaskLocked { .. } => "task_locked",
            Event::SentinelVerdict { .. } => "sentinel_verdict",
            Event::SentinelVeto { .. } => "sentinel_veto",
            Event::WorktreeReverted { .. } => "worktree_reverted",
            Event::SnapshotCreated { .. } => "snapshot_created",
            Event::CooldownEntered { .. } => "cooldown_entered",
            Event::CooldownExited { .. } => "cooldown_exited",
            Event::HandoffTriggered { .. } => "handoff_triggered",
            Event::ConfidenceUpdated { .. } => "confidence_updated",
        }
    }
}
