//! AgentLoop - drives one task to a passing verdict or a lock
//!
//! Invariants:
//! 1. Every attempt runs against a fresh, isolated worktree; changes never
//!    reach the parent tree without Sentinel approval.
//! 2. After a failed attempt the worktree is reverted to the last verified
//!    git hash when one is known; otherwise it is left unchanged.
//! 3. One concurrent attempt per task.
//! 4. After max_retries failed attempts the task locks and requires manual
//!    intervention.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::agents::{Actor, ActorContext, Sentinel, SentinelContext};
use crate::config::ResolvedAgentLoop;
use crate::domain::{Project, SentinelVerdict, Task, TaskError, TaskResult};
use crate::events::{Event, EventEmitter};
use crate::repomap::RepoMapProvider;
use crate::worktree::WorktreeManager;

/// Outcome of driving one task
#[derive(Debug)]
pub struct AgentLoopResult {
    pub success: bool,
    pub result: TaskResult,
    pub verdicts: Vec<SentinelVerdict>,
    pub worktree_path: PathBuf,

    /// Rolling hash over the approved diff, set on success
    pub verified_hash: Option<String>,

    /// Parent-tree HEAD after the approved change merged, set on success
    pub head_hash: Option<String>,
}

impl AgentLoopResult {
    /// True when the attempt stopped on a provider rate limit
    pub fn rate_limited(&self) -> bool {
        self.result.errors.iter().any(|e| e.code == "RATE_LIMITED")
    }
}

/// FNV-1a 32-bit rolling hash over the diff text, as 8 hex chars.
///
/// Cheap bookkeeping identity for "the diff that last passed"; the audit
/// record on the verdict uses SHA-256 instead.
pub fn rolling_diff_hash(diff: &str) -> String {
    let mut hash: u32 = 0x811c9dc5;
    for byte in diff.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    format!("{:08x}", hash)
}

/// The verification core: one Actor+Sentinel cycle with retries
pub struct AgentLoop {
    actor: Actor,
    sentinel: Sentinel,
    worktrees: WorktreeManager,
    repo_map: Arc<dyn RepoMapProvider>,
    emitter: EventEmitter,
    config: ResolvedAgentLoop,
    enable_worktrees: bool,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actor: Actor,
        sentinel: Sentinel,
        worktrees: WorktreeManager,
        repo_map: Arc<dyn RepoMapProvider>,
        emitter: EventEmitter,
        config: ResolvedAgentLoop,
        enable_worktrees: bool,
    ) -> Self {
        Self {
            actor,
            sentinel,
            worktrees,
            repo_map,
            emitter,
            config,
            enable_worktrees,
        }
    }

    /// Sentinel statistics observable by the snapshot engine
    pub fn sentinel_stats(&self) -> crate::domain::SentinelStats {
        self.sentinel.stats()
    }

    /// Drive `task` until a verdict passes or retries are exhausted
    pub async fn run_task(
        &self,
        task: &Task,
        project: &Project,
        plan: &str,
        definition_of_done: &str,
    ) -> AgentLoopResult {
        let project_path = PathBuf::from(&project.local_path);
        let worktree_name = format!("midnight-{}", task.id);

        // Worktree creation failure degrades to the parent tree
        let (worktree_path, isolated) = if self.enable_worktrees {
            match self.worktrees.create(&project_path, &worktree_name).await {
                Ok(info) => (info.path, true),
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Worktree creation failed, running in parent tree");
                    (project_path.clone(), false)
                }
            }
        } else {
            (project_path.clone(), false)
        };

        self.emitter.emit(Event::TaskStarted {
            project_id: project.id.clone(),
            task_id: task.id.clone(),
        });

        // Revert target: the project's last verified git hash, if any
        let last_verified_git_hash = project.git_hash.clone();

        let repo_map = self
            .repo_map
            .get_repo_map(&worktree_path)
            .await
            .unwrap_or_else(|e| format!("(repo map unavailable: {})", e));

        let mut previous_attempts: Vec<String> = Vec::new();
        let mut verdicts: Vec<SentinelVerdict> = Vec::new();
        let mut last_result = TaskResult::default();

        for attempt in 0..self.config.max_retries {
            info!(task_id = %task.id, attempt = attempt + 1, max = self.config.max_retries, "Agent loop attempt");

            // === Actor phase ===
            let actor_result = self
                .actor
                .execute(ActorContext {
                    task: task.clone(),
                    project_context: plan.to_string(),
                    previous_attempts: previous_attempts.clone(),
                    worktree_path: worktree_path.clone(),
                })
                .await;

            if !actor_result.success {
                self.emitter.emit(Event::TaskFailed {
                    project_id: project.id.clone(),
                    task_id: task.id.clone(),
                    reason: first_error(&actor_result),
                });

                let fatal = actor_result.has_fatal_error();
                let rate_limited = actor_result.errors.iter().any(|e| e.code == "RATE_LIMITED");
                if fatal || rate_limited {
                    return AgentLoopResult {
                        success: false,
                        result: actor_result,
                        verdicts,
                        worktree_path,
                        verified_hash: None,
                        head_hash: None,
                    };
                }

                previous_attempts.push(actor_result.output.clone());
                last_result = actor_result;
                continue;
            }

            let diff = self
                .worktrees
                .get_git_diff(&worktree_path)
                .await
                .unwrap_or_else(|_| "(no changes)".to_string());

            // === Veto pre-check ===
            if self.config.enable_veto {
                let violations = self.sentinel.check_veto(&diff);
                if !violations.is_empty() {
                    let verdict = self.sentinel.automatic_veto(&task.id, &diff, &violations);
                    self.emit_verdict(&verdict);
                    self.emitter.emit(Event::SentinelVeto {
                        task_id: task.id.clone(),
                        directive: verdict.correction_directive.clone().unwrap_or_default(),
                    });
                    verdicts.push(verdict);

                    self.maybe_revert(&worktree_path, &task.id, last_verified_git_hash.as_deref())
                        .await;

                    previous_attempts.push(format!("VETO: {}\n{}", violations.join("; "), actor_result.output));
                    last_result = actor_result;
                    continue;
                }
            }

            // === Full verification ===
            let verdict = self
                .sentinel
                .verify(SentinelContext {
                    task,
                    diff: &diff,
                    plan,
                    definition_of_done,
                    repo_map: &repo_map,
                    prior_verdicts: &verdicts,
                })
                .await;
            self.emit_verdict(&verdict);

            if verdict.passed {
                let verified_hash = rolling_diff_hash(&diff);

                // Approved: commit the attempt and merge it back so the
                // parent tree only ever sees Sentinel-approved changes
                let head_hash = self
                    .integrate_approved(&project_path, &worktree_path, &worktree_name, isolated)
                    .await;

                self.emitter.emit(Event::TaskCompleted {
                    project_id: project.id.clone(),
                    task_id: task.id.clone(),
                    quality_score: verdict.quality_score,
                });

                let mut result = actor_result;
                result.sentinel_verdict = Some(verdict.clone());
                verdicts.push(verdict);

                return AgentLoopResult {
                    success: true,
                    result,
                    verdicts,
                    worktree_path,
                    verified_hash: Some(verified_hash),
                    head_hash,
                };
            }

            // === Rejection ===
            let directive = verdict.correction_directive.clone().unwrap_or_default();
            self.emitter.emit(Event::SentinelVeto {
                task_id: task.id.clone(),
                directive: directive.clone(),
            });

            self.maybe_revert(&worktree_path, &task.id, last_verified_git_hash.as_deref())
                .await;

            previous_attempts.push(format!(
                "SENTINEL REJECTION (Score: {}): sins={}, slop={}, correction={}\nactor output={}",
                verdict.quality_score,
                verdict.audit_log.architectural_sins.join("; "),
                verdict.audit_log.slop_patterns.join("; "),
                directive,
                actor_result.output,
            ));
            verdicts.push(verdict);
            last_result = actor_result;
        }

        // === Lock ===
        let reason = format!("Max retries ({}) exceeded", self.config.max_retries);
        self.emitter.emit(Event::TaskLocked {
            project_id: project.id.clone(),
            task_id: task.id.clone(),
            reason: reason.clone(),
        });

        last_result.success = false;
        last_result.errors.push(TaskError::fatal("MAX_RETRIES", reason));
        last_result.sentinel_verdict = verdicts.last().cloned();

        // The reverted worktree is no longer needed once the task locks
        if isolated {
            if let Err(e) = self.worktrees.delete(&project_path, &worktree_name).await {
                warn!(task_id = %task.id, error = %e, "Worktree cleanup failed");
            }
        }

        AgentLoopResult {
            success: false,
            result: last_result,
            verdicts,
            worktree_path,
            verified_hash: None,
            head_hash: None,
        }
    }

    /// Commit and merge an approved attempt back into the parent tree,
    /// then drop the worktree. Best-effort: a failed merge leaves the
    /// approved work on its branch and is logged.
    async fn integrate_approved(
        &self,
        project_path: &std::path::Path,
        worktree_path: &std::path::Path,
        worktree_name: &str,
        isolated: bool,
    ) -> Option<String> {
        if let Err(e) = self.worktrees.auto_commit(worktree_path, "Approved by sentinel").await {
            warn!(error = %e, "Auto-commit of approved attempt failed");
        }

        if isolated {
            let target = match self.worktrees.current_branch(project_path).await {
                Ok(branch) => branch,
                Err(e) => {
                    warn!(error = %e, "Could not resolve parent branch for merge");
                    return None;
                }
            };
            if let Err(e) = self.worktrees.merge(project_path, worktree_name, &target).await {
                warn!(error = %e, "Merge of approved attempt failed");
                return None;
            }
            if let Err(e) = self.worktrees.delete(project_path, worktree_name).await {
                warn!(error = %e, "Worktree cleanup after merge failed");
            }
        }

        WorktreeManager::head_hash(project_path).await.ok()
    }

    fn emit_verdict(&self, verdict: &SentinelVerdict) {
        self.emitter.emit(Event::SentinelVerdict {
            task_id: verdict.task_id.clone(),
            verdict_id: verdict.id.clone(),
            quality_score: verdict.quality_score,
            passed: verdict.passed,
        });
    }

    /// Revert the worktree to the last verified hash. Failures are logged
    /// and do not abort the loop.
    async fn maybe_revert(&self, worktree_path: &std::path::Path, task_id: &str, to_hash: Option<&str>) {
        if !self.config.enable_revert {
            return;
        }
        let Some(hash) = to_hash else {
            return;
        };

        match self.worktrees.revert(worktree_path, hash).await {
            Ok(()) => {
                self.emitter.emit(Event::WorktreeReverted {
                    task_id: task_id.to_string(),
                    to_hash: hash.to_string(),
                });
            }
            Err(e) => {
                warn!(task_id, error = %e, "Worktree revert failed");
            }
        }
    }
}

fn first_error(result: &TaskResult) -> String {
    result
        .errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "Actor attempt failed".to_string())
}
