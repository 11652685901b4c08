//! StateEngine - snapshot capture, cooldown lifecycle, structured logging
//!
//! Owns the current agent-state record and the reasoning buffer, captures
//! periodic snapshots into the store, and manages provider cooldowns. The
//! `snapshot_created` event is emitted only after the snapshot is durable.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{AgentState, Cooldown, LogEntry, StateSnapshot, Store, now_ms};
use crate::events::{Event, EventEmitter};
use crate::gitops::GitOps;

/// Assistant messages retained in the reasoning trace
const REASONING_TRACE_LIMIT: usize = 10;

/// The snapshot/state engine
pub struct StateEngine {
    store: Arc<Store>,
    gitops: Arc<dyn GitOps>,
    emitter: EventEmitter,
    agent_state: Mutex<AgentState>,
    reasoning: Mutex<VecDeque<String>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl StateEngine {
    pub fn new(store: Arc<Store>, gitops: Arc<dyn GitOps>, emitter: EventEmitter) -> Self {
        Self {
            store,
            gitops,
            emitter,
            agent_state: Mutex::new(AgentState::default()),
            reasoning: Mutex::new(VecDeque::new()),
            timer: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AgentState> {
        self.agent_state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Mutate the current agent-state record
    pub fn update_agent_state(&self, f: impl FnOnce(&mut AgentState)) {
        f(&mut self.lock_state());
    }

    /// Snapshot of the current agent-state record
    pub fn agent_state(&self) -> AgentState {
        self.lock_state().clone()
    }

    /// Append an assistant message to the reasoning buffer (last 10 kept)
    pub fn push_reasoning(&self, line: impl Into<String>) {
        let mut buffer = self.reasoning.lock().unwrap_or_else(|p| p.into_inner());
        if buffer.len() == REASONING_TRACE_LIMIT {
            buffer.pop_front();
        }
        buffer.push_back(line.into());
    }

    /// Capture and persist a snapshot of the project's current state.
    ///
    /// Retention pruning happens in the same store transaction as the
    /// insert; the event fires only after the write returns.
    pub async fn save_snapshot(&self, project_id: &str) -> eyre::Result<String> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or_else(|| eyre::eyre!("Unknown project: {}", project_id))?;

        let git_hash = match self.gitops.head_hash(std::path::Path::new(&project.local_path)).await {
            Ok(hash) => hash,
            Err(e) => {
                debug!(project_id, error = %e, "No git hash available for snapshot");
                "unknown".to_string()
            }
        };

        let mut snapshot = StateSnapshot::new(project_id, git_hash, self.agent_state());
        snapshot.reasoning_trace = self
            .reasoning
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect();

        self.store.save_snapshot(&snapshot)?;
        self.emitter.emit(Event::SnapshotCreated {
            project_id: project_id.to_string(),
            snapshot_id: snapshot.id.clone(),
        });

        debug!(project_id, snapshot_id = %snapshot.id, "Snapshot saved");
        Ok(snapshot.id)
    }

    /// Start periodic snapshots for a project; takes one immediately.
    ///
    /// Starting for a new project cancels the previous timer first.
    pub async fn start_auto_snapshot(self: Arc<Self>, project_id: &str, interval_ms: u64) {
        self.stop_auto_snapshot();

        if let Err(e) = self.save_snapshot(project_id).await {
            warn!(project_id, error = %e, "Initial auto-snapshot failed");
        }

        let engine = Arc::clone(&self);
        let project_id = project_id.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if let Err(e) = engine.save_snapshot(&project_id).await {
                    warn!(project_id = %project_id, error = %e, "Auto-snapshot failed");
                }
            }
        });

        *self.timer.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        info!(interval_ms, "Auto-snapshot started");
    }

    /// Stop the auto-snapshot timer; idempotent
    pub fn stop_auto_snapshot(&self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
            debug!("Auto-snapshot stopped");
        }
    }

    /// Enter a provider cooldown: snapshot the current project first (if
    /// any), persist the cooldown keyed to that snapshot, emit the event
    pub async fn enter_cooldown(
        &self,
        provider: &str,
        resume_at: i64,
        reason: &str,
        current_project: Option<&str>,
    ) -> eyre::Result<Cooldown> {
        let snapshot_id = match current_project {
            Some(project_id) => match self.save_snapshot(project_id).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(provider, error = %e, "Cooldown snapshot failed");
                    None
                }
            },
            None => None,
        };

        let mut cooldown = Cooldown::new(provider, resume_at, reason);
        cooldown.snapshot_id = snapshot_id;
        self.store.add_cooldown(&cooldown)?;

        self.emitter.emit(Event::CooldownEntered {
            cooldown_id: cooldown.id.clone(),
            provider: provider.to_string(),
            resume_at,
        });

        info!(provider, resume_at, reason, "Entered cooldown");
        Ok(cooldown)
    }

    /// Cooldowns still blocking dispatch
    pub fn check_cooldowns(&self) -> eyre::Result<Vec<Cooldown>> {
        Ok(self.store.active_cooldowns(now_ms())?)
    }

    /// Remove expired cooldowns, emitting `cooldown_exited` once per row
    pub fn process_expired_cooldowns(&self) -> eyre::Result<Vec<Cooldown>> {
        let expired = self.store.expired_cooldowns(now_ms())?;
        for cooldown in &expired {
            self.store.remove_cooldown(&cooldown.id)?;
            self.emitter.emit(Event::CooldownExited {
                cooldown_id: cooldown.id.clone(),
                provider: cooldown.provider.clone(),
            });
            info!(provider = %cooldown.provider, "Cooldown exited");
        }
        Ok(expired)
    }

    /// Append a structured execution-log row
    pub fn log(
        &self,
        level: &str,
        source: &str,
        message: &str,
        context: Option<serde_json::Value>,
        project_id: Option<&str>,
        task_id: Option<&str>,
    ) {
        let entry = LogEntry {
            timestamp: now_ms(),
            level: level.to_string(),
            source: source.to_string(),
            message: message.to_string(),
            context,
            project_id: project_id.map(String::from),
            task_id: task_id.map(String::from),
        };
        if let Err(e) = self.store.append_log(&entry) {
            warn!(error = %e, "Failed to append execution log row");
        }
    }

    /// Record a named metric sample
    pub fn record_metric(&self, name: &str, value: f64, project_id: Option<&str>, tags: Option<serde_json::Value>) {
        if let Err(e) = self.store.record_metric(name, value, project_id, tags.as_ref()) {
            warn!(error = %e, "Failed to record metric");
        }
    }
}

impl Drop for StateEngine {
    fn drop(&mut self) {
        self.stop_auto_snapshot();
    }
}
