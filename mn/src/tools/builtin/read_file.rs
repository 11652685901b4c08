//! read_file tool

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Read a file from the workspace
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file's contents. Paths are relative to the workspace root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("path is required"),
        };

        let full_path = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Error reading file: {}", e)),
        };

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => ToolResult::success(content),
            Err(e) => ToolResult::error(format!("Error reading file: {}", e)),
        }
    }
}
