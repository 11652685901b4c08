//! git_commit tool

use async_trait::async_trait;
use serde_json::Value;

use super::run_command::format_exec;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Stage files and commit
pub struct GitCommitTool;

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &'static str {
        "git_commit"
    }

    fn description(&self) -> &'static str {
        "Stage files (all by default) and create a commit with the given message."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Commit message"
                },
                "files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Files to stage; all changes when omitted"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let message = match input["message"].as_str() {
            Some(m) => m,
            None => return ToolResult::error("message is required"),
        };

        let files: Vec<String> = input["files"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let add_target = if files.is_empty() {
            "-A".to_string()
        } else {
            files
                .iter()
                .map(|f| format!("\"{}\"", f.replace('"', "\\\"")))
                .collect::<Vec<_>>()
                .join(" ")
        };

        let escaped_message = message.replace('"', "\\\"");
        let command = format!("git add {} && git commit -m \"{}\"", add_target, escaped_message);

        match ctx.run_shell(&command, None).await {
            Ok(result) => {
                let formatted = format_exec(&result);
                if result.exit_code == 0 {
                    ToolResult::success(formatted)
                } else {
                    ToolResult::error(formatted)
                }
            }
            Err(e) => ToolResult::error(format!("Failed to commit: {}", e)),
        }
    }
}
