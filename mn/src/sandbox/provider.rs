//! SandboxProvider capability and configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from sandbox operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("No sandbox provider available")]
    Unavailable,

    #[error("Sandbox not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resource and environment bounds for a sandbox instance
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Virtual CPUs
    pub vcpus: u32,

    /// Memory limit in MB
    pub memory_mb: u64,

    /// Disk limit in MB
    pub disk_mb: u64,

    /// Process count limit
    pub max_pids: u32,

    /// Whether outbound network is enabled
    pub network_enabled: bool,

    /// Allowed hosts; empty means allow all
    pub network_allow: Vec<String>,

    /// Host directory mounted read-write at /workspace
    pub workspace: PathBuf,

    /// Environment variables inside the sandbox
    pub env: HashMap<String, String>,

    /// Default per-command timeout in milliseconds
    pub command_timeout_ms: u64,
}

impl SandboxConfig {
    /// Standard bounds for an Actor sandbox over the given workspace
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/home/titan".to_string());
        env.insert("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string());

        Self {
            vcpus: 2,
            memory_mb: 4096,
            disk_mb: 10240,
            max_pids: 100,
            network_enabled: true,
            network_allow: Vec::new(),
            workspace: workspace.into(),
            env,
            command_timeout_ms: 30_000,
        }
    }

    /// Add a caller-provided environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// A command to run inside a sandbox
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    /// Argv; element 0 is the program
    pub command: Vec<String>,

    /// Working directory inside the sandbox
    pub workdir: Option<PathBuf>,

    /// Extra environment variables for this command
    pub env: HashMap<String, String>,

    /// Data written to the command's stdin
    pub stdin: Option<String>,

    /// Timeout override in milliseconds
    pub timeout_ms: Option<u64>,
}

impl ExecRequest {
    /// Run a shell command line
    pub fn shell(command_line: impl Into<String>) -> Self {
        Self {
            command: vec!["sh".to_string(), "-c".to_string(), command_line.into()],
            ..Default::default()
        }
    }
}

/// Outcome of a sandboxed command
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,

    /// True when the command was killed on timeout
    pub killed: bool,
}

/// Capability consumed by the tool executor
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provider name used for selection ("kata", "docker", "native")
    fn name(&self) -> &'static str;

    /// Whether this provider can run on the current host
    async fn is_available(&self) -> bool;

    /// Create a sandbox instance; returns its id
    async fn create(&self, config: &SandboxConfig) -> Result<String, SandboxError>;

    async fn start(&self, id: &str) -> Result<(), SandboxError>;

    async fn stop(&self, id: &str) -> Result<(), SandboxError>;

    async fn destroy(&self, id: &str) -> Result<(), SandboxError>;

    /// Run a command inside the sandbox
    async fn execute(&self, id: &str, request: ExecRequest) -> Result<ExecResult, SandboxError>;
}

/// Pick a provider from the probe list.
///
/// Providers are tried in list order and the first available one wins. When
/// `requested` is given, only that provider is considered. Returns None when
/// nothing probes as available; callers fall back to the native provider.
pub async fn select_provider(
    providers: &[Arc<dyn SandboxProvider>],
    requested: Option<&str>,
) -> Option<Arc<dyn SandboxProvider>> {
    for provider in providers {
        if let Some(name) = requested {
            if provider.name() != name {
                continue;
            }
        }
        if provider.is_available().await {
            info!(provider = provider.name(), "Selected sandbox provider");
            return Some(provider.clone());
        }
        debug!(provider = provider.name(), "Sandbox provider not available");
    }
    None
}
