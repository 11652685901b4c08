//! ToolContext - execution context for tools
//!
//! Scoped to a single task attempt: all file operations resolve against the
//! workspace root and commands run through the selected sandbox provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::sandbox::{ExecRequest, ExecResult, SandboxError, SandboxProvider};

/// Execution context for tools
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root; all file ops constrained here
    pub workspace: PathBuf,

    /// Task id (for tracing)
    pub task_id: String,

    /// Sandbox executing run_command and friends
    sandbox: Arc<dyn SandboxProvider>,

    /// Sandbox instance id
    sandbox_id: String,
}

impl ToolContext {
    /// Create a context bound to a sandbox instance
    pub fn new(
        workspace: PathBuf,
        task_id: String,
        sandbox: Arc<dyn SandboxProvider>,
        sandbox_id: String,
    ) -> Self {
        Self {
            workspace,
            task_id,
            sandbox,
            sandbox_id,
        }
    }

    /// Resolve a model-supplied path against the workspace.
    ///
    /// Relative paths join the workspace root. Absolute paths are accepted
    /// only when they stay under the workspace; anything else is rejected so
    /// reads and writes cannot escape the sandboxed tree.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, String> {
        let raw = Path::new(path);
        let joined = if raw.is_absolute() { raw.to_path_buf() } else { self.workspace.join(raw) };

        // Normalize without touching the filesystem so new files resolve too
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                std::path::Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(format!("Path escapes workspace: {}", path));
                    }
                }
                std::path::Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        let workspace = self.workspace.canonicalize().unwrap_or_else(|_| self.workspace.clone());
        if normalized.starts_with(&workspace) || normalized.starts_with(&self.workspace) {
            Ok(normalized)
        } else {
            Err(format!("Path escapes workspace: {}", path))
        }
    }

    /// Run a shell command line inside the sandbox
    pub async fn run_shell(&self, command_line: &str, cwd: Option<&Path>) -> Result<ExecResult, SandboxError> {
        let mut request = ExecRequest::shell(command_line);
        if let Some(dir) = cwd {
            request.workdir = Some(dir.to_path_buf());
        }
        self.sandbox.execute(&self.sandbox_id, request).await
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("workspace", &self.workspace)
            .field("task_id", &self.task_id)
            .field("sandbox_id", &self.sandbox_id)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::sandbox::{NativeSandbox, SandboxConfig};

    /// Build a ToolContext over a native sandbox for tests
    pub async fn native_context(workspace: &Path) -> ToolContext {
        let sandbox: Arc<dyn SandboxProvider> = Arc::new(NativeSandbox::new());
        let id = sandbox.create(&SandboxConfig::for_workspace(workspace)).await.unwrap();
        ToolContext::new(workspace.to_path_buf(), "task-test".to_string(), sandbox, id)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::native_context;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_resolve_relative_path() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let resolved = ctx.resolve_path("src/main.rs").unwrap();
        assert!(resolved.starts_with(temp.path()));
        assert!(resolved.ends_with("src/main.rs"));
    }

    #[tokio::test]
    async fn test_resolve_absolute_inside_workspace() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let inside = temp.path().join("file.txt");
        assert!(ctx.resolve_path(inside.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_rejects_escape() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        assert!(ctx.resolve_path("/etc/passwd").is_err());
        assert!(ctx.resolve_path("../../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_resolve_normalizes_dot_segments() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let resolved = ctx.resolve_path("src/./a/../main.rs").unwrap();
        assert!(resolved.ends_with("src/main.rs"));
    }

    #[tokio::test]
    async fn test_run_shell() {
        let temp = tempdir().unwrap();
        let ctx = native_context(temp.path()).await;

        let result = ctx.run_shell("echo tool", None).await.unwrap();
        assert_eq!(result.stdout.trim(), "tool");
    }
}
