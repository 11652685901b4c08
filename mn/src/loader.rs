//! ProjectLoader capability
//!
//! Loads a project's DNA (idea, tech stack, definition of done), validates
//! it, and extracts an ordered task set. Extraction is deterministic: the
//! same DNA always yields the same tasks in the same order.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use eyre::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::domain::ProjectDna;

/// One task extracted from DNA
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub description: String,
    pub priority: i64,

    /// Indices into the extracted list of tasks this one depends on
    pub dependencies: Vec<usize>,
}

/// Result of DNA validation
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Loader capability consumed by the orchestrator
#[async_trait]
pub trait ProjectLoader: Send + Sync {
    /// Load the three-file DNA from a project directory
    async fn load_dna(&self, path: &Path) -> Result<ProjectDna>;

    /// Validate loaded DNA
    fn validate_dna(&self, dna: &ProjectDna) -> ValidationReport;

    /// Extract the ordered task set from DNA
    fn extract_tasks(&self, dna: &ProjectDna) -> Vec<TaskDefinition>;
}

/// Three-file DNA loader: `idea.md`, `tech_stack.json`,
/// `definition_of_done.md` at the project root
pub struct DnaFileLoader;

#[derive(Debug, Default, Deserialize)]
struct TechStackFile {
    #[serde(default)]
    runtime: BTreeMap<String, String>,
    #[serde(default)]
    dev: BTreeMap<String, String>,
}

#[async_trait]
impl ProjectLoader for DnaFileLoader {
    async fn load_dna(&self, path: &Path) -> Result<ProjectDna> {
        let idea = tokio::fs::read_to_string(path.join("idea.md"))
            .await
            .context("Failed to read idea.md")?;
        let definition_of_done = tokio::fs::read_to_string(path.join("definition_of_done.md"))
            .await
            .context("Failed to read definition_of_done.md")?;

        let stack_raw = tokio::fs::read_to_string(path.join("tech_stack.json"))
            .await
            .context("Failed to read tech_stack.json")?;
        let stack: TechStackFile = serde_json::from_str(&stack_raw).context("Failed to parse tech_stack.json")?;

        debug!(path = %path.display(), "Loaded project DNA");
        Ok(ProjectDna {
            idea,
            tech_stack: stack.runtime,
            dev_stack: stack.dev,
            definition_of_done,
        })
    }

    fn validate_dna(&self, dna: &ProjectDna) -> ValidationReport {
        let mut errors = Vec::new();

        if dna.idea.trim().is_empty() {
            errors.push("idea.md is empty".to_string());
        }
        if dna.definition_of_done.trim().is_empty() {
            errors.push("definition_of_done.md is empty".to_string());
        }
        if self.extract_tasks(dna).is_empty() {
            errors.push("definition_of_done.md contains no checklist items".to_string());
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Walk `definition_of_done.md` checklist lines in file order.
    ///
    /// Top-level items become tasks with descending priority; items
    /// indented under a top-level item depend on it.
    fn extract_tasks(&self, dna: &ProjectDna) -> Vec<TaskDefinition> {
        let mut tasks: Vec<TaskDefinition> = Vec::new();
        let mut last_top_level: Option<usize> = None;

        let items: Vec<(bool, String)> = dna
            .definition_of_done
            .lines()
            .filter_map(|line| {
                let trimmed = line.trim_start();
                let indent = line.len() - trimmed.len();
                let rest = trimmed
                    .strip_prefix("- [ ] ")
                    .or_else(|| trimmed.strip_prefix("- [x] "))
                    .or_else(|| trimmed.strip_prefix("* [ ] "))?;
                let description = rest.trim();
                if description.is_empty() {
                    return None;
                }
                Some((indent > 0, description.to_string()))
            })
            .collect();

        let count = items.len() as i64;
        for (index, (nested, description)) in items.into_iter().enumerate() {
            let dependencies = if nested {
                last_top_level.map(|parent| vec![parent]).unwrap_or_default()
            } else {
                last_top_level = Some(index);
                Vec::new()
            };

            tasks.push(TaskDefinition {
                description,
                priority: (count - index as i64) * 10,
                dependencies,
            });
        }

        tasks
    }
}
