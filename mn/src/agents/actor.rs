//! The Actor agent
//!
//! Produces a code change satisfying a task description by iterating:
//! call the model, execute the tool calls it requests inside the sandbox,
//! feed the results back, repeat until the model signals completion.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::domain::{Task, TaskArtifact, TaskError, TaskMetrics, TaskResult};
use crate::llm::{ChatClient, ChatMessage, ChatRequest, ToolCall};
use crate::prompts::{ACTOR_SYSTEM, ACTOR_TASK_TEMPLATE, render};
use crate::sandbox::{NativeSandbox, SandboxConfig, SandboxProvider, select_provider};
use crate::tools::{ToolContext, ToolExecutor};

/// Iteration bound for one Actor attempt
pub const MAX_ACTOR_ITERATIONS: u32 = 20;

/// Phrases that signal completion when no task_complete call was made
const COMPLETION_PHRASES: &[&str] = &[
    "task complete",
    "implementation complete",
    "ready for review",
    "done implementing",
];

/// Everything the Actor needs for one attempt
pub struct ActorContext {
    pub task: Task,

    /// Project idea text
    pub project_context: String,

    /// Rejected earlier attempts, oldest first
    pub previous_attempts: Vec<String>,

    /// Isolated working copy for this attempt
    pub worktree_path: PathBuf,
}

/// The worker agent
pub struct Actor {
    client: Arc<dyn ChatClient>,
    model: String,
    executor: ToolExecutor,

    /// Tools exposed to the model; names absent from the executor are
    /// silently dropped
    allowed_tools: Vec<String>,

    /// Sandbox providers in probe order; native fallback when none probe
    providers: Vec<Arc<dyn SandboxProvider>>,
}

impl Actor {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, providers: Vec<Arc<dyn SandboxProvider>>) -> Self {
        let executor = ToolExecutor::standard();
        let allowed_tools = vec![
            "read_file".to_string(),
            "write_file".to_string(),
            "run_command".to_string(),
            "run_tests".to_string(),
            "git_diff".to_string(),
            "git_commit".to_string(),
            "task_complete".to_string(),
        ];

        Self {
            client,
            model: model.into(),
            executor,
            allowed_tools,
            providers,
        }
    }

    /// Restrict the tools exposed to the model
    pub fn with_allowed_tools(mut self, allowed: Vec<String>) -> Self {
        self.allowed_tools = allowed;
        self
    }

    /// Run one attempt at the task. Never panics and never returns an Err:
    /// every failure is reified into the returned [`TaskResult`].
    pub async fn execute(&self, ctx: ActorContext) -> TaskResult {
        let started = Instant::now();
        match self.run_attempt(&ctx, started).await {
            Ok(result) => result,
            Err(e) => {
                warn!(task_id = %ctx.task.id, error = %e, "Actor attempt errored");
                TaskResult {
                    success: false,
                    output: format!("Actor error: {}", e),
                    errors: vec![TaskError::recoverable("ACTOR_ERROR", e.to_string())],
                    metrics: TaskMetrics {
                        latency_ms: started.elapsed().as_millis() as u64,
                        ..Default::default()
                    },
                    ..Default::default()
                }
            }
        }
    }

    async fn run_attempt(&self, ctx: &ActorContext, started: Instant) -> eyre::Result<TaskResult> {
        // Sandbox per attempt: created lazily here, destroyed on every exit
        let provider = match select_provider(&self.providers, None).await {
            Some(p) => p,
            None => {
                debug!("No sandbox provider available, running native");
                Arc::new(NativeSandbox::new()) as Arc<dyn SandboxProvider>
            }
        };
        let sandbox_config = SandboxConfig::for_workspace(&ctx.worktree_path);
        let sandbox_id = provider.create(&sandbox_config).await?;
        provider.start(&sandbox_id).await?;

        let tool_ctx = ToolContext::new(
            ctx.worktree_path.clone(),
            ctx.task.id.clone(),
            provider.clone(),
            sandbox_id.clone(),
        );

        let result = self.conversation_loop(ctx, &tool_ctx, started).await;

        if let Err(e) = provider.stop(&sandbox_id).await {
            warn!(error = %e, "Failed to stop sandbox");
        }
        if let Err(e) = provider.destroy(&sandbox_id).await {
            warn!(error = %e, "Failed to destroy sandbox");
        }

        result
    }

    async fn conversation_loop(
        &self,
        ctx: &ActorContext,
        tool_ctx: &ToolContext,
        started: Instant,
    ) -> eyre::Result<TaskResult> {
        let mut template_ctx = HashMap::new();
        template_ctx.insert("task_description", ctx.task.description.clone());
        template_ctx.insert("project_idea", ctx.project_context.clone());
        template_ctx.insert("previous_attempts", format_previous_attempts(&ctx.previous_attempts));

        let mut messages = vec![
            ChatMessage::system(ACTOR_SYSTEM),
            ChatMessage::user(render(ACTOR_TASK_TEMPLATE, &template_ctx)?),
        ];

        let tool_defs = self.executor.definitions_for(&self.allowed_tools);

        let mut artifacts: Vec<TaskArtifact> = Vec::new();
        let mut errors: Vec<TaskError> = Vec::new();
        let mut metrics = TaskMetrics::default();
        let mut success = false;

        while metrics.iterations < MAX_ACTOR_ITERATIONS {
            metrics.iterations += 1;

            let request = ChatRequest {
                model: Some(self.model.clone()),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                ..Default::default()
            };

            let response = match self.client.chat(request).await {
                Ok(r) => r,
                Err(e) if e.is_rate_limit() => {
                    let retry_ms = e.retry_after().map(|d| d.as_millis() as u64).unwrap_or(60_000);
                    errors.push(TaskError {
                        code: "RATE_LIMITED".to_string(),
                        message: e.to_string(),
                        recoverable: true,
                        suggestion: Some(retry_ms.to_string()),
                        file: None,
                        line: None,
                    });
                    break;
                }
                Err(e) => {
                    errors.push(TaskError::recoverable("ACTOR_ERROR", e.to_string()));
                    break;
                }
            };

            metrics.tokens_used += response.usage.total();

            let content = response.content.clone().unwrap_or_default();
            messages.push(ChatMessage::assistant_with_tools(
                content.clone(),
                response.tool_calls.clone(),
            ));

            let mut completed_via_tool = false;
            for call in &response.tool_calls {
                metrics.tool_calls += 1;
                let result = self.executor.execute(call, tool_ctx).await;

                if call.name == "task_complete" && !result.is_error {
                    completed_via_tool = true;
                }
                if result.is_error {
                    errors.push(TaskError::recoverable("TOOL_ERROR", result.content.clone()));
                }
                if let Some(artifact) = artifact_for(call) {
                    artifacts.push(artifact);
                }

                messages.push(ChatMessage::tool_result(&call.id, result.content));
            }

            if completed_via_tool || contains_completion_phrase(&content) {
                success = true;
                break;
            }

            if errors.iter().any(|e| !e.recoverable) {
                break;
            }

            if response.tool_calls.is_empty() && content.trim().is_empty() {
                // Model returned nothing actionable; stop burning iterations
                errors.push(TaskError::recoverable("ACTOR_ERROR", "Empty model response".to_string()));
                break;
            }
        }

        metrics.latency_ms = started.elapsed().as_millis() as u64;

        info!(
            task_id = %ctx.task.id,
            success,
            iterations = metrics.iterations,
            tool_calls = metrics.tool_calls,
            "Actor attempt finished"
        );

        Ok(TaskResult {
            success,
            output: summarize_messages(&messages),
            artifacts,
            errors,
            metrics,
            sentinel_verdict: None,
        })
    }
}

fn format_previous_attempts(attempts: &[String]) -> String {
    attempts
        .iter()
        .enumerate()
        .map(|(i, a)| format!("## Attempt {}\n{}\n", i + 1, truncate(a, 1_000)))
        .collect()
}

/// Map a tool call to its artifact kind, if it produces one
fn artifact_for(call: &ToolCall) -> Option<TaskArtifact> {
    match call.name.as_str() {
        "write_file" => Some(TaskArtifact::FileWrite {
            path: call.arguments["path"].as_str().unwrap_or("").to_string(),
        }),
        "git_diff" => Some(TaskArtifact::Diff {
            summary: "git diff".to_string(),
        }),
        "run_command" => Some(TaskArtifact::Command {
            command: call.arguments["command"].as_str().unwrap_or("").to_string(),
        }),
        "git_commit" => Some(TaskArtifact::Command {
            command: format!("git commit: {}", call.arguments["message"].as_str().unwrap_or("")),
        }),
        "run_tests" => Some(TaskArtifact::TestRun {
            pattern: call.arguments["pattern"].as_str().map(String::from),
        }),
        _ => None,
    }
}

fn contains_completion_phrase(content: &str) -> bool {
    let lower = content.to_lowercase();
    COMPLETION_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Short output summary: the last five messages, truncated
fn summarize_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .take(5)
        .rev()
        .map(|m| format!("[{:?}] {}", m.role, truncate(&m.content, 200)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;
    use crate::llm::client::mock::MockChatClient;
    use crate::llm::LlmError;
    use tempfile::tempdir;

    fn actor_ctx(worktree: &std::path::Path) -> ActorContext {
        ActorContext {
            task: Task::new("proj-1", "create README.md", 0),
            project_context: "a demo project".to_string(),
            previous_attempts: Vec::new(),
            worktree_path: worktree.to_path_buf(),
        }
    }

    fn tool_call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: format!("call-{}", name),
            name: name.to_string(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_single_iteration_completion_via_tool() {
        let temp = tempdir().unwrap();
        let client = Arc::new(MockChatClient::from_responses(vec![ChatResponse {
            content: Some("Writing the file now.".to_string()),
            tool_calls: vec![
                tool_call("write_file", serde_json::json!({"path": "README.md", "content": "hello"})),
                tool_call("task_complete", serde_json::json!({"summary": "README created"})),
            ],
            ..Default::default()
        }]));

        let actor = Actor::new(client, "builder", vec![]);
        let result = actor.execute(actor_ctx(temp.path())).await;

        assert!(result.success);
        assert_eq!(result.metrics.iterations, 1);
        assert_eq!(result.metrics.tool_calls, 2);
        assert!(temp.path().join("README.md").exists());
        assert!(matches!(result.artifacts[0], TaskArtifact::FileWrite { .. }));
    }

    #[tokio::test]
    async fn test_completion_phrase_detection() {
        let temp = tempdir().unwrap();
        let client = Arc::new(MockChatClient::from_responses(vec![ChatResponse {
            content: Some("All done. Implementation complete.".to_string()),
            ..Default::default()
        }]));

        let actor = Actor::new(client, "builder", vec![]);
        let result = actor.execute(actor_ctx(temp.path())).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_tool_error_is_recoverable_and_continues() {
        let temp = tempdir().unwrap();
        let client = Arc::new(MockChatClient::from_responses(vec![
            ChatResponse {
                content: Some("Reading a file first.".to_string()),
                tool_calls: vec![tool_call("read_file", serde_json::json!({"path": "missing.txt"}))],
                ..Default::default()
            },
            ChatResponse {
                content: Some("task complete".to_string()),
                ..Default::default()
            },
        ]));

        let actor = Actor::new(client, "builder", vec![]);
        let result = actor.execute(actor_ctx(temp.path())).await;

        assert!(result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "TOOL_ERROR");
        assert!(result.errors[0].recoverable);
    }

    #[tokio::test]
    async fn test_rate_limit_reified() {
        let temp = tempdir().unwrap();
        let client = Arc::new(MockChatClient::new(vec![Err(LlmError::RateLimited {
            retry_after: std::time::Duration::from_secs(90),
        })]));

        let actor = Actor::new(client, "builder", vec![]);
        let result = actor.execute(actor_ctx(temp.path())).await;

        assert!(!result.success);
        assert_eq!(result.errors[0].code, "RATE_LIMITED");
        assert_eq!(result.errors[0].suggestion.as_deref(), Some("90000"));
    }

    #[tokio::test]
    async fn test_iteration_bound() {
        let temp = tempdir().unwrap();
        // Scripted to keep calling a tool and never complete
        let responses: Vec<ChatResponse> = (0..MAX_ACTOR_ITERATIONS + 5)
            .map(|_| ChatResponse {
                content: Some("still working".to_string()),
                tool_calls: vec![tool_call("run_command", serde_json::json!({"command": "true"}))],
                ..Default::default()
            })
            .collect();
        let client = Arc::new(MockChatClient::from_responses(responses));

        let actor = Actor::new(client.clone(), "builder", vec![]);
        let result = actor.execute(actor_ctx(temp.path())).await;

        assert!(!result.success);
        assert_eq!(result.metrics.iterations, MAX_ACTOR_ITERATIONS);
        assert_eq!(client.call_count(), MAX_ACTOR_ITERATIONS as usize);
    }

    #[tokio::test]
    async fn test_empty_response_stops_early() {
        let temp = tempdir().unwrap();
        let client = Arc::new(MockChatClient::from_responses(vec![ChatResponse::default()]));

        let actor = Actor::new(client, "builder", vec![]);
        let result = actor.execute(actor_ctx(temp.path())).await;

        assert!(!result.success);
        assert_eq!(result.metrics.iterations, 1);
        assert!(result.errors.iter().any(|e| e.message.contains("Empty model response")));
    }

    #[test]
    fn test_artifact_mapping() {
        assert!(matches!(
            artifact_for(&tool_call("write_file", serde_json::json!({"path": "a"}))),
            Some(TaskArtifact::FileWrite { .. })
        ));
        assert!(matches!(
            artifact_for(&tool_call("run_tests", serde_json::json!({}))),
            Some(TaskArtifact::TestRun { pattern: None })
        ));
        assert!(artifact_for(&tool_call("read_file", serde_json::json!({"path": "a"}))).is_none());
        assert!(artifact_for(&tool_call("task_complete", serde_json::json!({"summary": "s"}))).is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo wörld, this is a long line";
        let out = truncate(text, 7);
        assert!(out.ends_with("..."));
    }
}
