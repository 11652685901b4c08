//! git_diff tool

use async_trait::async_trait;
use serde_json::Value;

use super::run_command::format_exec;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Show the working-tree diff, optionally staged only
pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &'static str {
        "git_diff"
    }

    fn description(&self) -> &'static str {
        "Show the current git diff. Pass staged=true for the staged diff."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "staged": {
                    "type": "boolean",
                    "description": "Show the staged diff instead of the working tree"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let command = if input["staged"].as_bool().unwrap_or(false) {
            "git diff --staged"
        } else {
            "git diff"
        };

        match ctx.run_shell(command, None).await {
            Ok(result) => {
                let formatted = format_exec(&result);
                if result.exit_code == 0 {
                    ToolResult::success(formatted)
                } else {
                    ToolResult::error(formatted)
                }
            }
            Err(e) => ToolResult::error(format!("Failed to run git diff: {}", e)),
        }
    }
}
