//! ToolExecutor - tool dispatch for one Actor attempt

use std::collections::HashMap;

use tracing::debug;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{
    GitCommitTool, GitDiffTool, ReadFileTool, RunCommandTool, RunTestsTool, TaskCompleteTool, WriteFileTool,
};
use super::{Tool, ToolContext, ToolResult};

/// Dispatches model tool calls to builtin tools
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create an executor with the standard Actor tool set
    pub fn standard() -> Self {
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();

        tools.insert("read_file".into(), Box::new(ReadFileTool));
        tools.insert("write_file".into(), Box::new(WriteFileTool));
        tools.insert("run_command".into(), Box::new(RunCommandTool));
        tools.insert("run_tests".into(), Box::new(RunTestsTool));
        tools.insert("git_diff".into(), Box::new(GitDiffTool));
        tools.insert("git_commit".into(), Box::new(GitCommitTool));
        tools.insert("task_complete".into(), Box::new(TaskCompleteTool));

        Self { tools }
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Add a tool
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool definitions for the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Definitions for an allow-list of tool names; only these are exposed
    pub fn definitions_for(&self, allow_list: &[String]) -> Vec<ToolDefinition> {
        allow_list
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Execute one tool call
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool = %call.name, task_id = %ctx.task_id, "ToolExecutor::execute");
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call.arguments.clone(), ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", call.name)),
        }
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}
