//! Orchestrator - owner of the phase machine and the project loop
//!
//! Pulls the highest-priority queued project, drives it through
//! loading/planning/building/verifying, fans out events, folds sentinel
//! verdicts into the confidence score, and rotates to the next project on
//! hand-off. All dependencies arrive through an explicit record; tests
//! construct them with fakes.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{Config, TrustLevel};
use crate::domain::{
    AssignedAgent, NewTask, Project, ProjectStatus, Store, TaskPatch, TaskStatus, now_ms,
};
use crate::events::{Event, EventBus};
use crate::handoff::HandoffRunner;
use crate::loader::ProjectLoader;
use crate::phase::{Phase, PhaseMachine};
use crate::r#loop::{AgentLoop, Confidence, calculate_confidence};
use crate::state::StateEngine;

/// Idle delay when the queue is empty
const IDLE_SLEEP: Duration = Duration::from_secs(5);

/// Backoff after an unhandled error in the main loop
const ERROR_SLEEP: Duration = Duration::from_secs(10);

/// Provider name used for gateway cooldowns
const GATEWAY_PROVIDER: &str = "gateway";

/// Explicit dependency record; there is no hidden state
pub struct OrchestratorDeps {
    pub store: Arc<Store>,
    pub loader: Arc<dyn ProjectLoader>,
    pub state: Arc<StateEngine>,
    pub agent_loop: Arc<AgentLoop>,
    pub handoff: Arc<HandoffRunner>,
    pub gitops: Arc<dyn crate::gitops::GitOps>,
    pub bus: Arc<EventBus>,
}

/// Result of driving one project through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOutcome {
    Completed,
    Failed,
    /// Interrupted by a provider cooldown; re-dispatched after expiry
    Cooldown,
    /// Interrupted by pause
    Paused,
}

/// Status snapshot answered to the CLI / observer
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub current_project: Option<String>,
    pub queue_length: u64,
    pub confidence_score: u8,
    pub confidence_level: String,
    pub uptime_ms: i64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub active_cooldowns: usize,
}

/// The top-level loop
pub struct Orchestrator {
    deps: OrchestratorDeps,
    config: Config,
    phase: Mutex<PhaseMachine>,
    running: AtomicBool,
    paused: AtomicBool,
    current_project: Mutex<Option<String>>,
    confidence: Mutex<Confidence>,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    started_at: i64,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps, config: Config) -> Self {
        Self {
            deps,
            config,
            phase: Mutex::new(PhaseMachine::new()),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            current_project: Mutex::new(None),
            confidence: Mutex::new(Confidence::initial()),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            started_at: now_ms(),
        }
    }

    fn lock_phase(&self) -> std::sync::MutexGuard<'_, PhaseMachine> {
        self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_current(&self, id: Option<String>) {
        *self.current_project.lock().unwrap_or_else(|p| p.into_inner()) = id;
    }

    fn current(&self) -> Option<String> {
        self.current_project.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Start the main loop; returns when stopped.
    ///
    /// Runs startup recovery first so a crashed process resumes where the
    /// store and snapshots say it was.
    pub async fn start(&self) -> eyre::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Orchestrator starting");

        if crate::state::check_needs_recovery(&self.deps.store)? {
            let results = crate::state::recover(&self.deps.store, &self.deps.gitops, &Default::default()).await?;
            for result in &results {
                self.deps.state.log(
                    "info",
                    "orchestrator",
                    &format!("recovered: {}", result.message),
                    None,
                    Some(&result.project_id),
                    None,
                );
            }
            info!(projects = results.len(), "Startup recovery complete");
        }

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.run_iteration().await {
                error!(error = %e, "Unhandled error in main loop");
                tokio::time::sleep(ERROR_SLEEP).await;
            }
        }

        info!("Orchestrator stopped");
        Ok(())
    }

    /// One pass of the main loop
    pub async fn run_iteration(&self) -> eyre::Result<()> {
        // Cooldowns gate all dispatch
        let active = self.deps.state.check_cooldowns()?;
        if !active.is_empty() {
            let min_resume = active.iter().map(|c| c.resume_at).min().unwrap_or(now_ms());
            let wait_ms = (min_resume - now_ms()).max(0) as u64;
            info!(wait_ms, "Sleeping through cooldown");
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;

            self.deps.state.process_expired_cooldowns()?;
            self.requeue_cooled_projects()?;
            let mut phase = self.lock_phase();
            if phase.state() == Phase::Cooldown {
                phase.transition(Phase::Idle);
            }
            return Ok(());
        }

        let Some(project) = self.deps.store.next_project()? else {
            tokio::time::sleep(IDLE_SLEEP).await;
            return Ok(());
        };

        self.set_current(Some(project.id.clone()));
        self.deps.bus.emit(Event::ProjectStarted {
            project_id: project.id.clone(),
        });

        let outcome = match self.process_project(&project).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(project_id = %project.id, error = %e, "process_project errored");
                self.fail_project(&project.id, &e.to_string());
                ProjectOutcome::Failed
            }
        };

        match outcome {
            // Full autonomy rotates to the next project through the
            // handoff phase; otherwise completion goes straight to idle
            ProjectOutcome::Completed => {
                let next = if self.config.trust_level == TrustLevel::FullAutonomy {
                    self.deps.store.next_project()?
                } else {
                    None
                };

                match next {
                    Some(next) => {
                        let completed = self
                            .deps
                            .store
                            .get_project(&project.id)?
                            .unwrap_or_else(|| project.clone());
                        self.lock_phase().transition(Phase::Handoff);
                        if let Err(e) = self.deps.handoff.run(&completed, &next).await {
                            warn!(error = %e, "Hand-off failed");
                        }
                        self.lock_phase().transition(Phase::Idle);
                    }
                    None => {
                        self.lock_phase().transition(Phase::Idle);
                    }
                }
            }
            // A paused build keeps its project state; the phase returns
            // to idle so the next dispatch starts clean
            ProjectOutcome::Paused => {
                self.lock_phase().transition(Phase::Idle);
            }
            ProjectOutcome::Failed | ProjectOutcome::Cooldown => {}
        }

        self.set_current(None);
        Ok(())
    }

    /// Drive one project through the pipeline
    pub async fn process_project(&self, project: &Project) -> eyre::Result<ProjectOutcome> {
        let store = &self.deps.store;

        // === Loading ===
        store.update_project_status(&project.id, ProjectStatus::Loading)?;
        self.lock_phase().transition(Phase::Loading);

        let dna = self
            .deps
            .loader
            .load_dna(std::path::Path::new(&project.local_path))
            .await?;
        let report = self.deps.loader.validate_dna(&dna);
        if !report.valid {
            let reason = format!("Invalid DNA: {}", report.errors.join("; "));
            self.fail_project(&project.id, &reason);
            return Ok(ProjectOutcome::Failed);
        }
        store.store_dna(&project.id, &dna)?;

        // === Planning ===
        store.update_project_status(&project.id, ProjectStatus::Planning)?;
        {
            let mut phase = self.lock_phase();
            phase.transition(Phase::Research);
            phase.transition(Phase::Planning);
        }

        // Tasks are only extracted once; a resumed project keeps its set
        if store.project_tasks(&project.id)?.is_empty() {
            let definitions = self.deps.loader.extract_tasks(&dna);
            let mut inserted_ids: Vec<String> = Vec::new();
            for definition in &definitions {
                let dependencies = definition
                    .dependencies
                    .iter()
                    .filter_map(|&index| inserted_ids.get(index).cloned())
                    .collect();
                let task = store.add_task(NewTask {
                    project_id: project.id.clone(),
                    description: definition.description.clone(),
                    priority: definition.priority,
                    dependencies,
                    assigned_agent: AssignedAgent::Actor,
                })?;
                inserted_ids.push(task.id);
            }
            info!(project_id = %project.id, tasks = inserted_ids.len(), "Tasks extracted");
        }

        // === Building ===
        self.deps
            .state
            .clone()
            .start_auto_snapshot(&project.id, self.config.snapshot_interval_ms)
            .await;
        store.update_project_status(&project.id, ProjectStatus::Building)?;
        self.lock_phase().transition(Phase::Building);

        let tasks = store.project_tasks(&project.id)?;
        let total_tasks = tasks.len().max(1);

        for task in tasks {
            if self.paused.load(Ordering::SeqCst) {
                store.update_project_status(&project.id, ProjectStatus::Paused)?;
                self.deps.state.stop_auto_snapshot();
                return Ok(ProjectOutcome::Paused);
            }
            if task.is_terminal() {
                continue;
            }

            let completed: Vec<String> = store
                .project_tasks(&project.id)?
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.id.clone())
                .collect();
            let completed_refs: Vec<&str> = completed.iter().map(String::as_str).collect();
            if !task.dependencies.iter().all(|d| completed_refs.contains(&d.as_str())) {
                warn!(task_id = %task.id, "Skipping task with unmet prerequisites");
                continue;
            }

            store.set_current_task(&project.id, Some(&task.id))?;
            store.update_task(
                &task.id,
                TaskPatch {
                    status: Some(TaskStatus::Running),
                    started_at: Some(Some(now_ms())),
                    ..Default::default()
                },
            )?;

            let progress = ((completed.len() * 100) / total_tasks) as u8;
            self.deps.state.update_agent_state(|s| {
                s.current_task_id = Some(task.id.clone());
                s.task_progress = progress;
            });

            // The project row may have gained a verified hash since dispatch
            let project_now = store.get_project(&project.id)?.unwrap_or_else(|| project.clone());
            let outcome = self
                .deps
                .agent_loop
                .run_task(&task, &project_now, &dna.idea, &dna.definition_of_done)
                .await;

            for verdict in &outcome.verdicts {
                store.add_verdict(verdict)?;
            }
            self.deps.state.push_reasoning(outcome.result.output.clone());
            self.deps.state.update_agent_state(|s| {
                s.sentinel_stats = self.deps.agent_loop.sentinel_stats();
                s.iteration_count = outcome.result.metrics.iterations;
                s.last_verdict_id = outcome.verdicts.last().map(|v| v.id.clone());
                s.actor_memory = outcome.result.output.clone();
            });
            self.update_confidence(&project.id)?;

            if outcome.rate_limited() {
                let resume_ms: i64 = outcome
                    .result
                    .errors
                    .iter()
                    .find(|e| e.code == "RATE_LIMITED")
                    .and_then(|e| e.suggestion.as_deref())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60_000);

                store.update_task(
                    &task.id,
                    TaskPatch {
                        status: Some(TaskStatus::Assigned),
                        started_at: Some(None),
                        ..Default::default()
                    },
                )?;
                self.deps
                    .state
                    .enter_cooldown(GATEWAY_PROVIDER, now_ms() + resume_ms, "rate limited", Some(&project.id))
                    .await?;
                store.update_project_status(&project.id, ProjectStatus::Cooldown)?;
                self.lock_phase().transition(Phase::Cooldown);
                self.deps.state.stop_auto_snapshot();
                return Ok(ProjectOutcome::Cooldown);
            }

            if outcome.success {
                store.update_task(
                    &task.id,
                    TaskPatch {
                        status: Some(TaskStatus::Completed),
                        completed_at: Some(Some(now_ms())),
                        result: Some(Some(outcome.result.clone())),
                        ..Default::default()
                    },
                )?;
                if let Some(head) = &outcome.head_hash {
                    store.set_project_git_hash(&project.id, head)?;
                }
                self.tasks_completed.fetch_add(1, Ordering::SeqCst);
            } else {
                let locked = outcome.result.errors.iter().any(|e| e.code == "MAX_RETRIES");
                store.update_task(
                    &task.id,
                    TaskPatch {
                        status: Some(if locked { TaskStatus::Locked } else { TaskStatus::Failed }),
                        completed_at: Some(Some(now_ms())),
                        result: Some(Some(outcome.result.clone())),
                        retry_count: Some(outcome.verdicts.len() as u32),
                        ..Default::default()
                    },
                )?;
                self.tasks_failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        store.set_current_task(&project.id, None)?;

        // === Verifying ===
        store.update_project_status(&project.id, ProjectStatus::Verifying)?;
        self.lock_phase().transition(Phase::Verifying);
        self.deps.state.stop_auto_snapshot();

        let all_done = store
            .project_tasks(&project.id)?
            .iter()
            .all(|t| t.status == TaskStatus::Completed);

        if all_done {
            store.update_project_status(&project.id, ProjectStatus::Completed)?;
            // Phase stays at verifying; the main loop walks it through
            // handoff (or straight to idle) once rotation is decided
            self.deps.bus.emit(Event::ProjectCompleted {
                project_id: project.id.clone(),
            });
            info!(project_id = %project.id, "Project completed");
            Ok(ProjectOutcome::Completed)
        } else {
            self.fail_project(&project.id, "Not all tasks completed");
            Ok(ProjectOutcome::Failed)
        }
    }

    fn fail_project(&self, project_id: &str, reason: &str) {
        self.deps.state.stop_auto_snapshot();
        if let Err(e) = self.deps.store.restore_project_status(project_id, ProjectStatus::Failed) {
            warn!(project_id, error = %e, "Could not persist failed status");
        }
        if let Err(e) = self.deps.store.set_project_error(project_id, Some(reason)) {
            warn!(project_id, error = %e, "Could not persist error message");
        }
        self.lock_phase().force_state(Phase::Idle);
        self.deps.bus.emit(Event::ProjectFailed {
            project_id: project_id.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Recompute confidence from the project's full verdict history
    /// (weighted average, newer verdicts weigh more) and broadcast it
    fn update_confidence(&self, project_id: &str) -> eyre::Result<()> {
        let history = self.deps.store.project_verdicts(project_id)?;
        let confidence = calculate_confidence(&history);
        *self.confidence.lock().unwrap_or_else(|p| p.into_inner()) = confidence;

        self.deps.bus.emit(Event::ConfidenceUpdated {
            project_id: project_id.to_string(),
            score: confidence.score,
            level: confidence.level,
        });
        self.deps
            .state
            .record_metric("confidence", confidence.score as f64, Some(project_id), None);
        Ok(())
    }

    /// Put cooled-down projects back in the dispatch queue
    fn requeue_cooled_projects(&self) -> eyre::Result<()> {
        for project in self.deps.store.list_projects()? {
            if project.status == ProjectStatus::Cooldown {
                self.deps.store.update_project_status(&project.id, ProjectStatus::Queued)?;
            }
        }
        Ok(())
    }

    /// Stop the loop. Graceful stop snapshots the current project first.
    pub async fn stop(&self, graceful: bool) {
        if graceful {
            if let Some(project_id) = self.current() {
                if let Err(e) = self.deps.state.save_snapshot(&project_id).await {
                    warn!(error = %e, "Shutdown snapshot failed");
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
        self.deps.state.stop_auto_snapshot();
        info!(graceful, "Orchestrator stop requested");
    }

    /// Pause: observable at the top of the task loop; the in-flight task
    /// finishes first
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        info!("Orchestrator paused");
    }

    /// Resume from pause, re-queueing any paused project
    pub fn resume(&self) -> eyre::Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        for project in self.deps.store.list_projects()? {
            if project.status == ProjectStatus::Paused {
                self.deps.store.update_project_status(&project.id, ProjectStatus::Queued)?;
            }
        }
        info!("Orchestrator resumed");
        Ok(())
    }

    /// Current status snapshot
    pub fn status(&self) -> eyre::Result<OrchestratorStatus> {
        let stats = self.deps.store.stats()?;
        let confidence = *self.confidence.lock().unwrap_or_else(|p| p.into_inner());
        let cooldowns = self.deps.state.check_cooldowns()?;

        Ok(OrchestratorStatus {
            running: self.running.load(Ordering::SeqCst),
            current_project: self.current(),
            queue_length: stats.queued,
            confidence_score: confidence.score,
            confidence_level: confidence.level.to_string(),
            uptime_ms: now_ms() - self.started_at,
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
            active_cooldowns: cooldowns.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Actor, Sentinel};
    use crate::config::ResolvedAgentLoop;
    use crate::gitops::CommandGitOps;
    use crate::llm::client::mock::MockChatClient;
    use crate::llm::{ChatResponse, Effort, LlmError, ToolCall};
    use crate::loader::DnaFileLoader;
    use crate::repomap::FileListingRepoMap;
    use crate::worktree::WorktreeManager;
    use tempfile::TempDir;

    fn actor_response() -> ChatResponse {
        ChatResponse {
            content: Some("Writing the file.".to_string()),
            tool_calls: vec![
                ToolCall {
                    id: "c1".to_string(),
                    name: "write_file".to_string(),
                    arguments: serde_json::json!({"path": "README.md", "content": "hello\n"}),
                },
                ToolCall {
                    id: "c2".to_string(),
                    name: "task_complete".to_string(),
                    arguments: serde_json::json!({"summary": "README created"}),
                },
            ],
            ..Default::default()
        }
    }

    fn sentinel_response(score: u8, passed: bool) -> ChatResponse {
        ChatResponse {
            content: Some(format!(
                r#"{{"quality_score": {}, "passed": {}, "audit_log": {{"traceability": {{"mapped": [], "missing": [], "unplanned": []}}, "architectural_sins": [], "slop_patterns_detected": []}}, "correction_directive": null}}"#,
                score, passed
            )),
            ..Default::default()
        }
    }

    async fn setup_project_dir(dir: &std::path::Path) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "t@t.com"],
            vec!["config", "user.name", "T"],
        ] {
            tokio::process::Command::new("git")
                .args(&args)
                .current_dir(dir)
                .output()
                .await
                .unwrap();
        }
        std::fs::write(dir.join("idea.md"), "# add README\n").unwrap();
        std::fs::write(dir.join("tech_stack.json"), r#"{"runtime": {}, "dev": {}}"#).unwrap();
        std::fs::write(dir.join("definition_of_done.md"), "- [ ] create README.md\n").unwrap();
        for args in [vec!["add", "-A"], vec!["commit", "-m", "dna"]] {
            tokio::process::Command::new("git")
                .args(&args)
                .current_dir(dir)
                .output()
                .await
                .unwrap();
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        store: Arc<Store>,
        bus: Arc<EventBus>,
        _worktree_base: TempDir,
    }

    fn build_fixture(
        actor_script: Vec<Result<ChatResponse, LlmError>>,
        sentinel_script: Vec<ChatResponse>,
        max_retries: u32,
    ) -> Fixture {
        let worktree_base = TempDir::new().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new(256));
        let gitops: Arc<dyn crate::gitops::GitOps> = Arc::new(CommandGitOps);
        let state = Arc::new(StateEngine::new(store.clone(), gitops.clone(), bus.emitter()));

        let actor = Actor::new(Arc::new(MockChatClient::new(actor_script)), "builder", vec![]);
        let sentinel = Sentinel::new(
            Arc::new(MockChatClient::from_responses(sentinel_script)),
            "auditor",
            Effort::Max,
            85,
        );
        let agent_loop = Arc::new(AgentLoop::new(
            actor,
            sentinel,
            WorktreeManager::new(worktree_base.path()),
            Arc::new(FileListingRepoMap::new()),
            bus.emitter(),
            ResolvedAgentLoop {
                enable_veto: true,
                enable_revert: true,
                quality_threshold: 85,
                max_retries,
            },
            true,
        ));
        let handoff = Arc::new(HandoffRunner::new(
            store.clone(),
            gitops.clone(),
            state.clone(),
            None,
            Default::default(),
            bus.emitter(),
        ));

        let config = Config {
            snapshot_interval_ms: 3_600_000,
            ..Default::default()
        };

        let orchestrator = Orchestrator::new(
            OrchestratorDeps {
                store: store.clone(),
                loader: Arc::new(DnaFileLoader),
                state,
                agent_loop,
                handoff,
                gitops,
                bus: bus.clone(),
            },
            config,
        );

        Fixture {
            orchestrator,
            store,
            bus,
            _worktree_base: worktree_base,
        }
    }

    // Scenario A end to end: one task, one iteration, pass
    #[tokio::test]
    async fn test_process_project_completes() {
        let project_dir = TempDir::new().unwrap();
        setup_project_dir(project_dir.path()).await;

        let fixture = build_fixture(
            vec![Ok(actor_response())],
            vec![sentinel_response(92, true)],
            3,
        );
        let mut rx = fixture.bus.subscribe();
        let project = fixture
            .store
            .add_project(&project_dir.path().to_string_lossy(), 0)
            .unwrap();

        let outcome = fixture.orchestrator.process_project(&project).await.unwrap();
        assert_eq!(outcome, ProjectOutcome::Completed);

        let stored = fixture.store.get_project(&project.id).unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Completed);
        assert!(stored.git_hash.is_some());

        let tasks = fixture.store.project_tasks(&project.id).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert!(tasks[0].result.as_ref().unwrap().success);

        // The approved change reached the parent tree
        assert!(project_dir.path().join("README.md").exists());

        // One verdict persisted, at least one snapshot, confidence healthy
        assert_eq!(fixture.store.verdicts_for_task(&tasks[0].id).unwrap().len(), 1);
        assert!(!fixture.store.list_snapshots(&project.id).unwrap().is_empty());

        let events: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type().to_string())
            .collect();
        assert!(events.contains(&"task_completed".to_string()));
        assert_eq!(events.last().unwrap(), "project_completed");

        let status = fixture.orchestrator.status().unwrap();
        assert_eq!(status.tasks_completed, 1);
        assert_eq!(status.confidence_level, "healthy");
    }

    // Scenario D: rate limit enters a cooldown keyed to a snapshot
    #[tokio::test]
    async fn test_rate_limit_enters_cooldown() {
        let project_dir = TempDir::new().unwrap();
        setup_project_dir(project_dir.path()).await;

        let fixture = build_fixture(
            vec![Err(LlmError::RateLimited {
                retry_after: std::time::Duration::from_secs(60),
            })],
            vec![],
            3,
        );
        let mut rx = fixture.bus.subscribe();
        let project = fixture
            .store
            .add_project(&project_dir.path().to_string_lossy(), 0)
            .unwrap();
        let tasks_before;

        let outcome = fixture.orchestrator.process_project(&project).await.unwrap();
        assert_eq!(outcome, ProjectOutcome::Cooldown);
        tasks_before = fixture.store.project_tasks(&project.id).unwrap();

        // Cooldown row written and keyed to a snapshot
        let cooldowns = fixture.store.active_cooldowns(now_ms()).unwrap();
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns[0].snapshot_id.is_some());

        // Interrupted task reset to assigned; the task list is unchanged
        assert_eq!(tasks_before.len(), 1);
        assert_eq!(tasks_before[0].status, TaskStatus::Assigned);
        assert!(tasks_before[0].started_at.is_none());

        assert_eq!(
            fixture.store.get_project(&project.id).unwrap().unwrap().status,
            ProjectStatus::Cooldown
        );

        let events: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type().to_string())
            .collect();
        assert!(events.contains(&"cooldown_entered".to_string()));
    }

    // Lock path: all attempts rejected, project fails
    #[tokio::test]
    async fn test_all_attempts_rejected_fails_project() {
        let project_dir = TempDir::new().unwrap();
        setup_project_dir(project_dir.path()).await;

        let fixture = build_fixture(
            vec![Ok(actor_response()), Ok(actor_response())],
            vec![sentinel_response(60, false), sentinel_response(60, false)],
            2,
        );
        let project = fixture
            .store
            .add_project(&project_dir.path().to_string_lossy(), 0)
            .unwrap();

        let outcome = fixture.orchestrator.process_project(&project).await.unwrap();
        assert_eq!(outcome, ProjectOutcome::Failed);

        let tasks = fixture.store.project_tasks(&project.id).unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Locked);
        assert_eq!(
            fixture.store.get_project(&project.id).unwrap().unwrap().status,
            ProjectStatus::Failed
        );

        // Weighted average of two 60s is 60: error
        let status = fixture.orchestrator.status().unwrap();
        assert_eq!(status.tasks_failed, 1);
        assert_eq!(status.confidence_score, 60);
        assert_eq!(status.confidence_level, "error");
    }

    // Scenario F: full-autonomy rotation through run_iteration
    #[tokio::test]
    async fn test_run_iteration_hands_off_to_next_project() {
        let project_dir = TempDir::new().unwrap();
        setup_project_dir(project_dir.path()).await;

        let fixture = build_fixture(
            vec![Ok(actor_response())],
            vec![sentinel_response(92, true)],
            3,
        );
        let mut rx = fixture.bus.subscribe();
        let first = fixture
            .store
            .add_project(&project_dir.path().to_string_lossy(), 5)
            .unwrap();
        let next = fixture.store.add_project("/tmp/next-up", 1).unwrap();

        fixture.orchestrator.run_iteration().await.unwrap();

        assert_eq!(
            fixture.store.get_project(&first.id).unwrap().unwrap().status,
            ProjectStatus::Completed
        );
        let promoted = fixture.store.get_project(&next.id).unwrap().unwrap();
        assert!(promoted.priority > 1);

        let events: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type().to_string())
            .collect();
        assert!(events.contains(&"handoff_triggered".to_string()));
        assert!(fixture.orchestrator.current().is_none());

        // Rotation walked verifying -> handoff -> idle
        let phase = fixture.orchestrator.lock_phase();
        assert_eq!(phase.state(), Phase::Idle);
        assert!(phase.history().any(|p| *p == Phase::Handoff));
    }

    #[tokio::test]
    async fn test_invalid_dna_fails_immediately() {
        let project_dir = TempDir::new().unwrap();
        setup_project_dir(project_dir.path()).await;
        // Empty the definition of done so validation fails
        std::fs::write(project_dir.path().join("definition_of_done.md"), "").unwrap();

        let fixture = build_fixture(vec![], vec![], 3);
        let project = fixture
            .store
            .add_project(&project_dir.path().to_string_lossy(), 0)
            .unwrap();

        let outcome = fixture.orchestrator.process_project(&project).await.unwrap();
        assert_eq!(outcome, ProjectOutcome::Failed);

        let stored = fixture.store.get_project(&project.id).unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Failed);
        assert!(stored.error_message.unwrap().contains("Invalid DNA"));
    }

    #[tokio::test]
    async fn test_pause_interrupts_before_next_task() {
        let project_dir = TempDir::new().unwrap();
        setup_project_dir(project_dir.path()).await;

        let fixture = build_fixture(vec![], vec![], 3);
        fixture.orchestrator.pause();

        let project = fixture
            .store
            .add_project(&project_dir.path().to_string_lossy(), 0)
            .unwrap();
        let outcome = fixture.orchestrator.process_project(&project).await.unwrap();
        assert_eq!(outcome, ProjectOutcome::Paused);
        assert_eq!(
            fixture.store.get_project(&project.id).unwrap().unwrap().status,
            ProjectStatus::Paused
        );

        // Resume re-queues the paused project
        fixture.orchestrator.resume().unwrap();
        assert_eq!(
            fixture.store.get_project(&project.id).unwrap().unwrap().status,
            ProjectStatus::Queued
        );
    }
}
