//! write_file tool

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Write content to a file, creating parent directories as needed
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("path is required"),
        };
        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("content is required"),
        };

        let full_path = match ctx.resolve_path(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Error writing file: {}", e)),
        };

        if let Some(parent) = full_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Error writing file: {}", e));
            }
        }

        match tokio::fs::write(&full_path, content).await {
            Ok(()) => ToolResult::success(format!("Successfully wrote to {}", path)),
            Err(e) => ToolResult::error(format!("Error writing file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::test_support::native_context;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_file_and_parents() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let result = WriteFileTool
            .execute(
                serde_json::json!({"path": "src/deep/mod.rs", "content": "pub mod deep;"}),
                &ctx,
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "Successfully wrote to src/deep/mod.rs");

        let written = std::fs::read_to_string(temp.path().join("src/deep/mod.rs")).unwrap();
        assert_eq!(written, "pub mod deep;");
    }

    #[tokio::test]
    async fn test_write_missing_content() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let result = WriteFileTool.execute(serde_json::json!({"path": "a.txt"}), &ctx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_write_escape_rejected() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let result = WriteFileTool
            .execute(serde_json::json!({"path": "/tmp/outside.txt", "content": "x"}), &ctx)
            .await;
        assert!(result.is_error);
    }
}
