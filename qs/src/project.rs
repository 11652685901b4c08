//! Project and DNA row types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{generate_id, now_ms};

/// Lifecycle status of a project in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Waiting in the queue for dispatch
    #[default]
    Queued,
    /// DNA being loaded and validated
    Loading,
    /// Tasks being extracted from DNA
    Planning,
    /// Tasks being executed by the agent loop
    Building,
    /// Final verification of all tasks
    Verifying,
    /// All tasks passed
    Completed,
    /// At least one task failed unrecoverably
    Failed,
    /// Manually paused by the operator
    Paused,
    /// Waiting out a provider cooldown
    Cooldown,
}

impl ProjectStatus {
    /// Legal successor statuses, mirroring the orchestration phase graph
    pub fn legal_successors(&self) -> &'static [ProjectStatus] {
        use ProjectStatus::*;
        match self {
            Queued => &[Loading, Paused],
            Loading => &[Planning, Failed, Queued],
            Planning => &[Building, Failed, Queued],
            Building => &[Verifying, Cooldown, Failed, Queued, Paused],
            Verifying => &[Building, Completed, Failed, Queued],
            Cooldown => &[Building, Queued],
            Paused => &[Queued, Loading],
            Completed => &[],
            Failed => &[Queued],
        }
    }

    /// Check whether a transition to `to` is legal (same-status is a no-op)
    pub fn can_transition_to(&self, to: ProjectStatus) -> bool {
        *self == to || self.legal_successors().contains(&to)
    }

    /// Statuses that indicate the process died mid-pipeline
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Loading | ProjectStatus::Planning | ProjectStatus::Building | ProjectStatus::Verifying
        )
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Loading => "loading",
            Self::Planning => "planning",
            Self::Building => "building",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cooldown => "cooldown",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "loading" => Ok(Self::Loading),
            "planning" => Ok(Self::Planning),
            "building" => Ok(Self::Building),
            "verifying" => Ok(Self::Verifying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            "cooldown" => Ok(Self::Cooldown),
            other => Err(format!("Unknown project status: {}", other)),
        }
    }
}

/// A queued software project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Optional remote repository URL
    pub repo_url: Option<String>,

    /// Absolute local path to the working tree
    pub local_path: String,

    /// Current status
    pub status: ProjectStatus,

    /// Dispatch priority (higher runs first)
    pub priority: i64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Set when the project first enters loading or building
    pub started_at: Option<i64>,

    /// Set when the project completes or fails
    pub completed_at: Option<i64>,

    /// Id of the task currently being driven
    pub current_task_id: Option<String>,

    /// Last verified git hash
    pub git_hash: Option<String>,

    /// Last error message, if any
    pub error_message: Option<String>,
}

impl Project {
    /// Create a new queued project
    pub fn new(name: impl Into<String>, local_path: impl Into<String>, priority: i64) -> Self {
        Self {
            id: generate_id("proj"),
            name: name.into(),
            repo_url: None,
            local_path: local_path.into(),
            status: ProjectStatus::Queued,
            priority,
            created_at: now_ms(),
            started_at: None,
            completed_at: None,
            current_task_id: None,
            git_hash: None,
            error_message: None,
        }
    }
}

/// A project's three-file specification: idea, tech stack, definition of done
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDna {
    /// Idea description (markdown)
    pub idea: String,

    /// Package name -> version constraint, runtime dependencies
    pub tech_stack: BTreeMap<String, String>,

    /// Package name -> version constraint, development dependencies
    pub dev_stack: BTreeMap<String, String>,

    /// Definition-of-done text (markdown)
    pub definition_of_done: String,
}

impl ProjectDna {
    /// Create DNA with empty stacks
    pub fn new(idea: impl Into<String>, definition_of_done: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            tech_stack: BTreeMap::new(),
            dev_stack: BTreeMap::new(),
            definition_of_done: definition_of_done.into(),
        }
    }
}
