//! Crash recovery
//!
//! On boot, brings persistent state back to a consistent, re-runnable form:
//! picks a recovery point per in-flight project, resets the working tree to
//! it, restores task states, and derives the project status from the
//! snapshot's agent state.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{LogEntry, Project, ProjectStatus, StateSnapshot, Store, TaskPatch, TaskStatus, now_ms};
use crate::gitops::GitOps;

/// Options controlling a recovery pass
#[derive(Debug, Clone, Default)]
pub struct RecoveryOptions {
    /// Recover from this snapshot id instead of the selected one
    pub force_snapshot: Option<String>,

    /// Leave the working tree alone
    pub skip_git_reset: bool,

    /// Also reset failed tasks to pending
    pub clear_failed_tasks: bool,
}

/// Outcome of recovering one project
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub project_id: String,
    pub snapshot_id: Option<String>,
    pub restored_tasks: usize,
    pub new_status: ProjectStatus,
    pub message: String,
}

/// True iff any project is stuck mid-pipeline
pub fn check_needs_recovery(store: &Store) -> eyre::Result<bool> {
    Ok(store.list_projects()?.iter().any(|p| p.status.is_in_flight()))
}

/// Select the best recovery point for a project.
///
/// Walks snapshots newest-first and returns the first healthy one (no
/// vetoes, or average quality at or above 85); falls back to the newest
/// snapshot, then to None.
pub fn find_recovery_point(store: &Store, project_id: &str) -> eyre::Result<Option<StateSnapshot>> {
    let snapshots = store.list_snapshots(project_id)?;
    if let Some(healthy) = snapshots.iter().find(|s| s.is_healthy()) {
        return Ok(Some(healthy.clone()));
    }
    Ok(snapshots.into_iter().next())
}

/// Recover every in-flight project
pub async fn recover(store: &Arc<Store>, gitops: &Arc<dyn GitOps>, options: &RecoveryOptions) -> eyre::Result<Vec<RecoveryResult>> {
    let mut results = Vec::new();
    for project in store.list_projects()? {
        if !project.status.is_in_flight() {
            continue;
        }
        results.push(recover_project(store, gitops, &project, options).await?);
    }
    info!(recovered = results.len(), "Recovery pass complete");
    Ok(results)
}

/// Recover a single project
pub async fn recover_project(
    store: &Arc<Store>,
    gitops: &Arc<dyn GitOps>,
    project: &Project,
    options: &RecoveryOptions,
) -> eyre::Result<RecoveryResult> {
    let snapshot = match &options.force_snapshot {
        Some(id) => store.get_snapshot(id)?,
        None => find_recovery_point(store, &project.id)?,
    };

    let Some(snapshot) = snapshot else {
        store.restore_project_status(&project.id, ProjectStatus::Queued)?;
        info!(project_id = %project.id, "No snapshot available, reset to queued");
        return Ok(RecoveryResult {
            project_id: project.id.clone(),
            snapshot_id: None,
            restored_tasks: 0,
            new_status: ProjectStatus::Queued,
            message: "no snapshot, reset to queued".to_string(),
        });
    };

    if !options.skip_git_reset && snapshot.git_hash != "unknown" {
        let path = Path::new(&project.local_path);
        if let Err(e) = gitops.hard_reset(path, &snapshot.git_hash).await {
            warn!(project_id = %project.id, error = %e, "Git reset failed during recovery");
        } else if let Err(e) = gitops.clean_untracked(path).await {
            warn!(project_id = %project.id, error = %e, "Git clean failed during recovery");
        }
    }

    let restored_tasks = restore_task_states(store, &project.id, &snapshot, options)?;

    let new_status = post_recovery_status(&snapshot);
    store.restore_project_status(&project.id, new_status)?;

    let message = format!(
        "recovered from snapshot {} ({} tasks restored)",
        snapshot.id, restored_tasks
    );
    store.append_log(&LogEntry {
        timestamp: now_ms(),
        level: "info".to_string(),
        source: "recovery".to_string(),
        message: message.clone(),
        context: None,
        project_id: Some(project.id.clone()),
        task_id: None,
    })?;
    info!(project_id = %project.id, snapshot_id = %snapshot.id, restored_tasks, status = %new_status, "Project recovered");

    Ok(RecoveryResult {
        project_id: project.id.clone(),
        snapshot_id: Some(snapshot.id),
        restored_tasks,
        new_status,
        message,
    })
}

/// Restore task states after a crash.
///
/// Running and verifying tasks go back to assigned; failed tasks reset to
/// pending when requested; locks that postdate the snapshot are released.
fn restore_task_states(
    store: &Store,
    project_id: &str,
    snapshot: &StateSnapshot,
    options: &RecoveryOptions,
) -> eyre::Result<usize> {
    let mut restored = 0usize;

    for task in store.project_tasks(project_id)? {
        match task.status {
            TaskStatus::Running | TaskStatus::Verifying => {
                store.update_task(
                    &task.id,
                    TaskPatch {
                        status: Some(TaskStatus::Assigned),
                        started_at: Some(None),
                        ..Default::default()
                    },
                )?;
                restored += 1;
            }
            TaskStatus::Failed if options.clear_failed_tasks => {
                store.update_task(
                    &task.id,
                    TaskPatch {
                        status: Some(TaskStatus::Pending),
                        retry_count: Some(0),
                        result: Some(None),
                        ..Default::default()
                    },
                )?;
                restored += 1;
            }
            TaskStatus::Locked => {
                // A lock that postdates the snapshot belongs to the crashed
                // run; release it
                if task.completed_at.is_some_and(|t| t > snapshot.created_at) {
                    store.update_task(
                        &task.id,
                        TaskPatch {
                            status: Some(TaskStatus::Pending),
                            ..Default::default()
                        },
                    )?;
                    restored += 1;
                }
            }
            _ => {}
        }
    }

    Ok(restored)
}

/// Derive the post-recovery project status from the snapshot's agent state
fn post_recovery_status(snapshot: &StateSnapshot) -> ProjectStatus {
    let state = &snapshot.agent_state;
    if state.current_task_id.is_some() && state.task_progress > 0 {
        ProjectStatus::Building
    } else if state.last_verdict_id.is_some() {
        ProjectStatus::Verifying
    } else {
        ProjectStatus::Planning
    }
}

/// Clear worktree paths on non-running tasks and drop expired cooldowns
pub fn cleanup_orphans(store: &Store, project_id: &str) -> eyre::Result<usize> {
    let mut cleaned = 0usize;

    for task in store.project_tasks(project_id)? {
        if task.status != TaskStatus::Running && task.worktree_path.is_some() {
            store.update_task(
                &task.id,
                TaskPatch {
                    worktree_path: Some(None),
                    ..Default::default()
                },
            )?;
            cleaned += 1;
        }
    }

    for cooldown in store.expired_cooldowns(now_ms())? {
        store.remove_cooldown(&cooldown.id)?;
        cleaned += 1;
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentState, AssignedAgent, NewTask, SentinelStats};
    use crate::gitops::CommandGitOps;

    fn setup() -> (Arc<Store>, Arc<dyn GitOps>) {
        (Arc::new(Store::open_in_memory().unwrap()), Arc::new(CommandGitOps))
    }

    fn in_flight_project(store: &Store) -> Project {
        let p = store.add_project("/tmp/not-a-repo", 0).unwrap();
        store.update_project_status(&p.id, ProjectStatus::Loading).unwrap();
        store.update_project_status(&p.id, ProjectStatus::Planning).unwrap();
        store.update_project_status(&p.id, ProjectStatus::Building).unwrap();
        store.get_project(&p.id).unwrap().unwrap()
    }

    fn snapshot_for(store: &Store, project_id: &str, state: AgentState, created_at: i64) -> StateSnapshot {
        let mut snap = StateSnapshot::new(project_id, "unknown", state);
        snap.created_at = created_at;
        store.save_snapshot(&snap).unwrap();
        snap
    }

    fn add_task(store: &Store, project_id: &str, status: TaskStatus) -> String {
        let task = store
            .add_task(NewTask {
                project_id: project_id.to_string(),
                description: "x".to_string(),
                priority: 0,
                dependencies: vec![],
                assigned_agent: AssignedAgent::Actor,
            })
            .unwrap();
        store
            .update_task(
                &task.id,
                TaskPatch {
                    status: Some(status),
                    started_at: Some(Some(now_ms())),
                    ..Default::default()
                },
            )
            .unwrap();
        task.id
    }

    #[test]
    fn test_needs_recovery_detection() {
        let (store, _git) = setup();
        assert!(!check_needs_recovery(&store).unwrap());

        in_flight_project(&store);
        assert!(check_needs_recovery(&store).unwrap());
    }

    #[test]
    fn test_find_recovery_point_prefers_healthy() {
        let (store, _git) = setup();
        let p = in_flight_project(&store);

        let unhealthy = AgentState {
            sentinel_stats: SentinelStats {
                verification_count: 2,
                veto_count: 2,
                average_quality_score: 40.0,
            },
            ..Default::default()
        };
        let healthy = AgentState {
            sentinel_stats: SentinelStats {
                verification_count: 2,
                veto_count: 0,
                average_quality_score: 90.0,
            },
            ..Default::default()
        };

        let old_healthy = snapshot_for(&store, &p.id, healthy, 1_000);
        let _new_unhealthy = snapshot_for(&store, &p.id, unhealthy, 2_000);

        // Newest-first walk skips the unhealthy head
        let point = find_recovery_point(&store, &p.id).unwrap().unwrap();
        assert_eq!(point.id, old_healthy.id);
    }

    #[test]
    fn test_find_recovery_point_falls_back_to_newest() {
        let (store, _git) = setup();
        let p = in_flight_project(&store);

        let unhealthy = || AgentState {
            sentinel_stats: SentinelStats {
                verification_count: 2,
                veto_count: 2,
                average_quality_score: 40.0,
            },
            ..Default::default()
        };
        let _older = snapshot_for(&store, &p.id, unhealthy(), 1_000);
        let newer = snapshot_for(&store, &p.id, unhealthy(), 2_000);

        let point = find_recovery_point(&store, &p.id).unwrap().unwrap();
        assert_eq!(point.id, newer.id);
    }

    #[test]
    fn test_find_recovery_point_none_without_snapshots() {
        let (store, _git) = setup();
        let p = in_flight_project(&store);
        assert!(find_recovery_point(&store, &p.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recover_without_snapshot_resets_to_queued() {
        let (store, git) = setup();
        let p = in_flight_project(&store);

        let result = recover_project(&store, &git, &p, &RecoveryOptions::default()).await.unwrap();
        assert!(result.snapshot_id.is_none());
        assert_eq!(result.new_status, ProjectStatus::Queued);
        assert_eq!(
            store.get_project(&p.id).unwrap().unwrap().status,
            ProjectStatus::Queued
        );
    }

    // Scenario E: crash during building with a running task
    #[tokio::test]
    async fn test_recover_restores_running_task_and_status() {
        let (store, git) = setup();
        let p = in_flight_project(&store);

        let done_1 = add_task(&store, &p.id, TaskStatus::Completed);
        let done_2 = add_task(&store, &p.id, TaskStatus::Completed);
        let running = add_task(&store, &p.id, TaskStatus::Running);

        let state = AgentState {
            current_task_id: Some(running.clone()),
            task_progress: 40,
            ..Default::default()
        };
        snapshot_for(&store, &p.id, state, now_ms());

        let options = RecoveryOptions {
            skip_git_reset: true,
            ..Default::default()
        };
        let result = recover_project(&store, &git, &p, &options).await.unwrap();

        assert_eq!(result.restored_tasks, 1);
        assert_eq!(result.new_status, ProjectStatus::Building);

        let restored = store.get_task(&running).unwrap().unwrap();
        assert_eq!(restored.status, TaskStatus::Assigned);
        assert!(restored.started_at.is_none());

        // Completed tasks untouched
        for id in [done_1, done_2] {
            assert_eq!(store.get_task(&id).unwrap().unwrap().status, TaskStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_recover_clears_failed_tasks_when_asked() {
        let (store, git) = setup();
        let p = in_flight_project(&store);
        let failed = add_task(&store, &p.id, TaskStatus::Failed);
        snapshot_for(&store, &p.id, AgentState::default(), now_ms());

        let options = RecoveryOptions {
            skip_git_reset: true,
            clear_failed_tasks: true,
            ..Default::default()
        };
        recover_project(&store, &git, &p, &options).await.unwrap();

        let task = store.get_task(&failed).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
    }

    #[tokio::test]
    async fn test_recover_releases_post_snapshot_locks() {
        let (store, git) = setup();
        let p = in_flight_project(&store);

        // Snapshot predates the lock
        snapshot_for(&store, &p.id, AgentState::default(), 1_000);
        let locked = add_task(&store, &p.id, TaskStatus::Locked);
        store
            .update_task(
                &locked,
                TaskPatch {
                    completed_at: Some(Some(2_000)),
                    ..Default::default()
                },
            )
            .unwrap();

        let options = RecoveryOptions {
            skip_git_reset: true,
            ..Default::default()
        };
        recover_project(&store, &git, &p, &options).await.unwrap();

        assert_eq!(store.get_task(&locked).unwrap().unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_post_recovery_status_derivation() {
        let building = StateSnapshot::new(
            "p",
            "h",
            AgentState {
                current_task_id: Some("t".to_string()),
                task_progress: 10,
                ..Default::default()
            },
        );
        assert_eq!(post_recovery_status(&building), ProjectStatus::Building);

        let verifying = StateSnapshot::new(
            "p",
            "h",
            AgentState {
                last_verdict_id: Some("v".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(post_recovery_status(&verifying), ProjectStatus::Verifying);

        let planning = StateSnapshot::new("p", "h", AgentState::default());
        assert_eq!(post_recovery_status(&planning), ProjectStatus::Planning);
    }

    #[tokio::test]
    async fn test_recover_all_in_flight() {
        let (store, git) = setup();
        let p1 = in_flight_project(&store);
        let p2 = in_flight_project(&store);
        let _queued = store.add_project("/tmp/queued", 0).unwrap();

        let results = recover(&store, &git, &RecoveryOptions::default()).await.unwrap();
        assert_eq!(results.len(), 2);
        let ids: Vec<&str> = results.iter().map(|r| r.project_id.as_str()).collect();
        assert!(ids.contains(&p1.id.as_str()));
        assert!(ids.contains(&p2.id.as_str()));
    }

    #[test]
    fn test_cleanup_orphans() {
        let (store, _git) = setup();
        let p = in_flight_project(&store);

        let stale = add_task(&store, &p.id, TaskStatus::Assigned);
        store
            .update_task(
                &stale,
                TaskPatch {
                    worktree_path: Some(Some("/tmp/worktrees/old".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();

        let running = add_task(&store, &p.id, TaskStatus::Running);
        store
            .update_task(
                &running,
                TaskPatch {
                    worktree_path: Some(Some("/tmp/worktrees/live".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();

        let cleaned = cleanup_orphans(&store, &p.id).unwrap();
        assert_eq!(cleaned, 1);
        assert!(store.get_task(&stale).unwrap().unwrap().worktree_path.is_none());
        assert!(store.get_task(&running).unwrap().unwrap().worktree_path.is_some());
    }
}
