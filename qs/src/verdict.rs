//! Sentinel verdict row types

use serde::{Deserialize, Serialize};

use crate::{generate_id, now_ms};

/// Requirement traceability computed by the sentinel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Traceability {
    /// Requirements the diff maps to
    pub mapped: Vec<String>,

    /// Requirements the diff should have covered but did not
    pub missing: Vec<String>,

    /// Changes with no corresponding requirement
    pub unplanned: Vec<String>,
}

/// The sentinel's audit log for one verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuditLog {
    pub traceability: Traceability,

    /// Structural violations (including automatic veto reasons)
    pub architectural_sins: Vec<String>,

    /// Low-effort patterns detected in the diff
    pub slop_patterns: Vec<String>,
}

/// A sentinel's decision record for one actor attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelVerdict {
    /// Unique identifier
    pub id: String,

    /// Task the verdict adjudicates
    pub task_id: String,

    /// Quality score in [0, 100]
    pub quality_score: u8,

    /// True only when the score clears the threshold and no veto fired
    pub passed: bool,

    /// Thinking-effort tag requested from the model
    pub thinking_effort: String,

    /// Full audit log
    pub audit_log: AuditLog,

    /// Socratic correction directive; None iff passed
    pub correction_directive: Option<String>,

    /// SHA-256 of the diff, truncated to 16 hex chars
    pub verification_hash: String,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl SentinelVerdict {
    /// Create a verdict shell for a task; callers fill in the decision fields
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            id: generate_id("verdict"),
            task_id: task_id.into(),
            quality_score: 0,
            passed: false,
            thinking_effort: "max".to_string(),
            audit_log: AuditLog::default(),
            correction_directive: None,
            verification_hash: String::new(),
            created_at: now_ms(),
        }
    }
}
