//! Midnight configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::Effort;

/// Autonomy tier gating auto-apply, auto-commit, and auto-rotate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum TrustLevel {
    /// Never auto-apply
    Supervised,
    /// Terminal allowed, no auto-commit
    Assistant,
    /// Auto-apply, auto-commit, auto-rotate projects on hand-off
    #[default]
    FullAutonomy,
}

impl TryFrom<u8> for TrustLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Supervised),
            2 => Ok(Self::Assistant),
            3 => Ok(Self::FullAutonomy),
            other => Err(format!("trust-level must be 1, 2, or 3 (got {})", other)),
        }
    }
}

impl From<TrustLevel> for u8 {
    fn from(level: TrustLevel) -> Self {
        match level {
            TrustLevel::Supervised => 1,
            TrustLevel::Assistant => 2,
            TrustLevel::FullAutonomy => 3,
        }
    }
}

/// Main Midnight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Autonomy tier (1-3)
    #[serde(rename = "trust-level")]
    pub trust_level: TrustLevel,

    /// Directory holding the durable queue store
    #[serde(rename = "queue-path")]
    pub queue_path: PathBuf,

    /// Auto-snapshot interval in milliseconds
    #[serde(rename = "snapshot-interval-ms")]
    pub snapshot_interval_ms: u64,

    /// Minimum sentinel score for a pass
    #[serde(rename = "quality-threshold")]
    pub quality_threshold: u8,

    /// Failed attempts before a task locks
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Model identifier for the Actor
    #[serde(rename = "actor-model")]
    pub actor_model: String,

    /// Model identifier for the Sentinel
    #[serde(rename = "sentinel-model")]
    pub sentinel_model: String,

    /// Thinking-effort requested for sentinel verifications
    #[serde(rename = "sentinel-effort")]
    pub sentinel_effort: Effort,

    /// Isolate each task attempt in a git worktree
    #[serde(rename = "enable-worktrees")]
    pub enable_worktrees: bool,

    /// Prefer the kata sandbox provider when probing
    #[serde(rename = "enable-kata-containers")]
    pub enable_kata_containers: bool,

    /// Log file path override
    #[serde(rename = "log-path")]
    pub log_path: Option<PathBuf>,

    /// PID file path override
    #[serde(rename = "pid-file")]
    pub pid_file: Option<PathBuf>,

    /// Verbose (debug-level) logging
    pub verbose: bool,

    /// Agent-loop sub-configuration
    #[serde(rename = "agent-loop")]
    pub agent_loop: AgentLoopConfig,

    /// Hand-off sub-configuration
    pub handoff: HandoffConfig,

    /// Chat-completions gateway
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trust_level: TrustLevel::FullAutonomy,
            queue_path: default_queue_path(),
            snapshot_interval_ms: 5 * 60 * 1000,
            quality_threshold: 85,
            max_retries: 3,
            actor_model: "midnight-actor-1".to_string(),
            sentinel_model: "midnight-sentinel-1".to_string(),
            sentinel_effort: Effort::Max,
            enable_worktrees: true,
            enable_kata_containers: true,
            log_path: None,
            pid_file: None,
            verbose: false,
            agent_loop: AgentLoopConfig::default(),
            handoff: HandoffConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn default_queue_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("midnight")
        .join("queue")
}

impl Config {
    /// Load configuration with fallback chain: explicit path, then
    /// `.midnight.yml`, then `~/.config/midnight/midnight.yml`, then
    /// defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".midnight.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("midnight").join("midnight.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Agent-loop settings with sub-config overrides applied over the
    /// top-level defaults
    pub fn resolved_agent_loop(&self) -> ResolvedAgentLoop {
        ResolvedAgentLoop {
            enable_veto: self.agent_loop.enable_veto,
            enable_revert: self.agent_loop.enable_revert,
            quality_threshold: self.agent_loop.quality_threshold.unwrap_or(self.quality_threshold),
            max_retries: self.agent_loop.max_retries.unwrap_or(self.max_retries),
        }
    }
}

/// Agent-loop sub-configuration; unset fields inherit top-level values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    /// Run the veto pre-check before full verification
    #[serde(rename = "enable-veto")]
    pub enable_veto: bool,

    /// Revert the worktree after a failed attempt
    #[serde(rename = "enable-revert")]
    pub enable_revert: bool,

    #[serde(rename = "quality-threshold")]
    pub quality_threshold: Option<u8>,

    #[serde(rename = "max-retries")]
    pub max_retries: Option<u32>,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            enable_veto: true,
            enable_revert: true,
            quality_threshold: None,
            max_retries: None,
        }
    }
}

/// Fully resolved agent-loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAgentLoop {
    pub enable_veto: bool,
    pub enable_revert: bool,
    pub quality_threshold: u8,
    pub max_retries: u32,
}

/// Hand-off sub-configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Push the completed project's branch to origin
    #[serde(rename = "push-to-remote")]
    pub push_to_remote: bool,

    /// Invoke the deployment trigger
    #[serde(rename = "trigger-deployment")]
    pub trigger_deployment: bool,

    /// Clean up worktrees on the completed project
    #[serde(rename = "cleanup-worktrees")]
    pub cleanup_worktrees: bool,

    /// POST a hand-off notification to this URL
    #[serde(rename = "notify-webhook")]
    pub notify_webhook: Option<String>,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            push_to_remote: false,
            trigger_deployment: false,
            cleanup_worktrees: true,
            notify_webhook: None,
        }
    }
}

/// Chat-completions gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Default model when a request does not specify one
    pub model: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            api_key_env: "MIDNIGHT_GATEWAY_KEY".to_string(),
            model: "midnight-actor-1".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.trust_level, TrustLevel::FullAutonomy);
        assert_eq!(config.snapshot_interval_ms, 300_000);
        assert_eq!(config.quality_threshold, 85);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.sentinel_effort, Effort::Max);
        assert!(config.enable_worktrees);
    }

    #[test]
    fn test_trust_level_from_number() {
        let yaml = "trust-level: 1";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.trust_level, TrustLevel::Supervised);

        let bad: Result<Config, _> = serde_yaml::from_str("trust-level: 7");
        assert!(bad.is_err());
    }

    #[test]
    fn test_deserialize_full_config() {
        let yaml = r#"
trust-level: 3
queue-path: /var/lib/midnight/queue
snapshot-interval-ms: 60000
quality-threshold: 90
max-retries: 2
actor-model: builder-xl
sentinel-model: auditor-xl
sentinel-effort: high
enable-worktrees: false

agent-loop:
  enable-veto: true
  enable-revert: false
  quality-threshold: 95

handoff:
  push-to-remote: true
  notify-webhook: "https://example.com/hook"

gateway:
  base-url: https://gateway.internal
  api-key-env: MY_KEY
  max-tokens: 8192
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.queue_path, PathBuf::from("/var/lib/midnight/queue"));
        assert_eq!(config.quality_threshold, 90);
        assert_eq!(config.actor_model, "builder-xl");
        assert_eq!(config.sentinel_effort, Effort::High);
        assert!(!config.enable_worktrees);
        assert!(config.handoff.push_to_remote);
        assert_eq!(config.handoff.notify_webhook.as_deref(), Some("https://example.com/hook"));
        assert_eq!(config.gateway.base_url, "https://gateway.internal");

        let resolved = config.resolved_agent_loop();
        assert_eq!(resolved.quality_threshold, 95);
        assert_eq!(resolved.max_retries, 2);
        assert!(!resolved.enable_revert);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = "max-retries: 5";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.quality_threshold, 85);
        assert_eq!(config.gateway.api_key_env, "MIDNIGHT_GATEWAY_KEY");
    }

    #[test]
    fn test_resolved_agent_loop_inherits_top_level() {
        let config = Config::default();
        let resolved = config.resolved_agent_loop();
        assert_eq!(resolved.quality_threshold, 85);
        assert_eq!(resolved.max_retries, 3);
        assert!(resolved.enable_veto);
        assert!(resolved.enable_revert);
    }
}
