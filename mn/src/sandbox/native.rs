//! Native (no isolation) sandbox provider
//!
//! Runs commands directly on the host with the configured environment and
//! timeout. Used when no container/VM provider probes as available; the
//! resource bounds in [`SandboxConfig`] are not enforced here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::provider::{ExecRequest, ExecResult, SandboxConfig, SandboxError, SandboxProvider};

struct Instance {
    workspace: PathBuf,
    env: HashMap<String, String>,
    command_timeout_ms: u64,
}

/// Sandbox provider that executes on the host process
pub struct NativeSandbox {
    instances: Mutex<HashMap<String, Instance>>,
}

impl NativeSandbox {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn instance_settings(&self, id: &str) -> Result<(PathBuf, HashMap<String, String>, u64), SandboxError> {
        let instances = self.instances.lock().unwrap_or_else(|p| p.into_inner());
        let instance = instances.get(id).ok_or_else(|| SandboxError::NotFound(id.to_string()))?;
        Ok((
            instance.workspace.clone(),
            instance.env.clone(),
            instance.command_timeout_ms,
        ))
    }
}

impl Default for NativeSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxProvider for NativeSandbox {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn create(&self, config: &SandboxConfig) -> Result<String, SandboxError> {
        let id = format!("native-{}", uuid::Uuid::now_v7());
        let mut instances = self.instances.lock().unwrap_or_else(|p| p.into_inner());
        instances.insert(
            id.clone(),
            Instance {
                workspace: config.workspace.clone(),
                env: config.env.clone(),
                command_timeout_ms: config.command_timeout_ms,
            },
        );
        debug!(%id, workspace = %config.workspace.display(), "Created native sandbox");
        Ok(id)
    }

    async fn start(&self, _id: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn stop(&self, _id: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SandboxError> {
        let mut instances = self.instances.lock().unwrap_or_else(|p| p.into_inner());
        instances.remove(id);
        Ok(())
    }

    async fn execute(&self, id: &str, request: ExecRequest) -> Result<ExecResult, SandboxError> {
        let (workspace, env, default_timeout) = self.instance_settings(id)?;

        if request.command.is_empty() {
            return Err(SandboxError::Spawn("empty command".to_string()));
        }

        let workdir = request.workdir.unwrap_or(workspace);
        let timeout_ms = request.timeout_ms.unwrap_or(default_timeout);

        let mut cmd = tokio::process::Command::new(&request.command[0]);
        cmd.args(&request.command[1..])
            .current_dir(&workdir)
            .envs(&env)
            .envs(&request.env)
            .stdin(if request.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn(e.to_string()))?;

        if let Some(stdin_data) = request.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(stdin_data.as_bytes()).await {
                    warn!(error = %e, "Failed to write command stdin");
                }
            }
        }

        let output = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match output {
            Ok(Ok(output)) => Ok(ExecResult {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration_ms,
                killed: false,
            }),
            Ok(Err(e)) => Err(SandboxError::Spawn(e.to_string())),
            Err(_) => {
                // Child is killed on drop of the future's handle
                debug!(timeout_ms, "Command killed on timeout");
                Ok(ExecResult {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms,
                    killed: true,
                })
            }
        }
    }
}
