//! run_command tool

use async_trait::async_trait;
use serde_json::Value;

use crate::sandbox::ExecResult;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Render an exec outcome as the tool-result string: stdout, then tagged
/// stderr/timeout/exit-code sections, with "(no output)" for nothing at all
pub fn format_exec(result: &ExecResult) -> String {
    let mut out = String::new();
    out.push_str(result.stdout.trim_end());

    if !result.stderr.trim().is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[stderr] {}", result.stderr.trim_end()));
    }
    if result.killed {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[timeout] Command killed after {}ms", result.duration_ms));
    }
    if result.exit_code != 0 && !result.killed {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[exit code] {}", result.exit_code));
    }

    if out.is_empty() { "(no output)".to_string() } else { out }
}

/// Execute a shell command inside the sandbox
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the workspace. Use for builds, git, and inspection."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory relative to the workspace"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("command is required"),
        };

        let cwd = match input["cwd"].as_str() {
            Some(dir) => match ctx.resolve_path(dir) {
                Ok(p) => Some(p),
                Err(e) => return ToolResult::error(e),
            },
            None => None,
        };

        match ctx.run_shell(command, cwd.as_deref()).await {
            Ok(result) => {
                let formatted = format_exec(&result);
                if result.exit_code == 0 && !result.killed {
                    ToolResult::success(formatted)
                } else {
                    ToolResult::error(formatted)
                }
            }
            Err(e) => ToolResult::error(format!("Failed to execute command: {}", e)),
        }
    }
}
