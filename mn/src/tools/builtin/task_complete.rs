//! task_complete tool

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Signal that the current task is complete.
///
/// The Actor's iteration loop detects this call and finishes the attempt;
/// the tool itself only echoes the summary.
pub struct TaskCompleteTool;

#[async_trait]
impl Tool for TaskCompleteTool {
    fn name(&self) -> &'static str {
        "task_complete"
    }

    fn description(&self) -> &'static str {
        "Signal that the task is complete. Use only when the work is done and tested."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Brief summary of what was accomplished"
                }
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let summary = match input["summary"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("summary is required"),
        };

        info!(task_id = %ctx.task_id, %summary, "Task completion signaled");
        ToolResult::success(format!("Task completed: {}", summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::test_support::native_context;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_task_complete() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let result = TaskCompleteTool
            .execute(serde_json::json!({"summary": "added README"}), &ctx)
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "Task completed: added README");
    }

    #[tokio::test]
    async fn test_task_complete_requires_summary() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let result = TaskCompleteTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }
}
