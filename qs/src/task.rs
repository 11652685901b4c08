//! Task row types and result records

use serde::{Deserialize, Serialize};

use crate::verdict::SentinelVerdict;
use crate::{generate_id, now_ms};

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for prerequisites or dispatch
    #[default]
    Pending,
    /// Claimed by an agent but not started
    Assigned,
    /// Actor working on the task
    Running,
    /// Sentinel adjudicating the produced diff
    Verifying,
    /// Passed verification
    Completed,
    /// Failed with a non-recoverable error
    Failed,
    /// Exhausted retries; terminal until manual intervention
    Locked,
    /// Worktree changes were rolled back
    Reverted,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Locked => "locked",
            Self::Reverted => "reverted",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "running" => Ok(Self::Running),
            "verifying" => Ok(Self::Verifying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "locked" => Ok(Self::Locked),
            "reverted" => Ok(Self::Reverted),
            other => Err(format!("Unknown task status: {}", other)),
        }
    }
}

/// Which agent a task is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignedAgent {
    #[default]
    Actor,
    Sentinel,
}

impl std::fmt::Display for AssignedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Actor => write!(f, "actor"),
            Self::Sentinel => write!(f, "sentinel"),
        }
    }
}

/// A unit of work within a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// What needs to be done
    pub description: String,

    /// Current status
    pub status: TaskStatus,

    /// Agent responsible for the task
    pub assigned_agent: AssignedAgent,

    /// Ordering priority (higher runs first)
    pub priority: i64,

    /// Task ids that must complete before this one may run
    pub dependencies: Vec<String>,

    /// Path of the worktree for the current attempt, if any
    pub worktree_path: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Set when the attempt starts
    pub started_at: Option<i64>,

    /// Set when the task reaches a terminal status
    pub completed_at: Option<i64>,

    /// Result of the last attempt
    pub result: Option<TaskResult>,

    /// Failed attempts so far
    pub retry_count: u32,
}

impl Task {
    /// Create a new pending task
    pub fn new(project_id: impl Into<String>, description: impl Into<String>, priority: i64) -> Self {
        Self {
            id: generate_id("task"),
            project_id: project_id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            assigned_agent: AssignedAgent::Actor,
            priority,
            dependencies: Vec::new(),
            worktree_path: None,
            created_at: now_ms(),
            started_at: None,
            completed_at: None,
            result: None,
            retry_count: 0,
        }
    }

    /// Check whether every prerequisite appears in the completed set
    pub fn is_eligible(&self, completed: &[&str]) -> bool {
        self.status == TaskStatus::Pending && self.dependencies.iter().all(|d| completed.contains(&d.as_str()))
    }

    /// Terminal statuses (no further automatic work)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Locked
        )
    }
}

/// An artifact produced during a task attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskArtifact {
    FileWrite { path: String },
    Diff { summary: String },
    Command { command: String },
    TestRun { pattern: Option<String> },
}

/// An error recorded during a task attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    /// Machine-readable code, e.g. `ACTOR_ERROR`, `MAX_RETRIES`
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Whether the loop may continue past this error
    pub recoverable: bool,

    /// Optional remediation hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    /// Optional source location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl TaskError {
    /// Create a recoverable error
    pub fn recoverable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recoverable: true,
            suggestion: None,
            file: None,
            line: None,
        }
    }

    /// Create a fatal error
    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recoverable: false,
            suggestion: None,
            file: None,
            line: None,
        }
    }
}

/// Usage accounting for one task attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskMetrics {
    /// Total tokens across all iterations
    pub tokens_used: u64,

    /// Wall-clock latency in milliseconds
    pub latency_ms: u64,

    /// Actor iterations consumed
    pub iterations: u32,

    /// Tool calls executed
    pub tool_calls: u32,
}

/// The outcome record of a task attempt
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskResult {
    /// Whether the attempt succeeded
    pub success: bool,

    /// Short textual summary of the output
    pub output: String,

    /// Artifacts in production order
    pub artifacts: Vec<TaskArtifact>,

    /// Errors in occurrence order
    pub errors: Vec<TaskError>,

    /// Usage accounting
    pub metrics: TaskMetrics,

    /// Embedded sentinel verdict, when one was reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel_verdict: Option<SentinelVerdict>,
}

impl TaskResult {
    /// True when any recorded error is non-recoverable
    pub fn has_fatal_error(&self) -> bool {
        self.errors.iter().any(|e| !e.recoverable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new() {
        let t = Task::new("proj-1", "create README.md", 10);
        assert!(t.id.starts_with("task-"));
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.assigned_agent, AssignedAgent::Actor);
        assert_eq!(t.retry_count, 0);
    }

    #[test]
    fn test_task_eligibility() {
        let mut t = Task::new("proj-1", "wire the API", 0);
        t.dependencies = vec!["task-a".to_string(), "task-b".to_string()];

        assert!(!t.is_eligible(&["task-a"]));
        assert!(t.is_eligible(&["task-a", "task-b"]));

        t.status = TaskStatus::Running;
        assert!(!t.is_eligible(&["task-a", "task-b"]));
    }

    #[test]
    fn test_task_terminal() {
        let mut t = Task::new("proj-1", "x", 0);
        assert!(!t.is_terminal());
        t.status = TaskStatus::Locked;
        assert!(t.is_terminal());
    }

    #[test]
    fn test_result_fatal_detection() {
        let mut result = TaskResult::default();
        result.errors.push(TaskError::recoverable("TOOL_ERROR", "file missing"));
        assert!(!result.has_fatal_error());

        result.errors.push(TaskError::fatal("MAX_RETRIES", "exhausted"));
        assert!(result.has_fatal_error());
    }

    #[test]
    fn test_artifact_serde_tagging() {
        let a = TaskArtifact::FileWrite {
            path: "src/main.rs".to_string(),
        };
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains("\"kind\":\"file_write\""));
        let back: TaskArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}
