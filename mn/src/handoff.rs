//! Hand-off phase
//!
//! Finalizes a completed project and promotes the next queued one. Every
//! side effect past the status write is best-effort: a failed tag, push,
//! deployment, cleanup, or webhook is logged and never blocks the rotation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::HandoffConfig;
use crate::domain::{Project, ProjectStatus, Store};
use crate::events::{Event, EventEmitter};
use crate::gitops::GitOps;
use crate::state::StateEngine;

/// Priority assigned to the promoted project so the next dispatch picks it
const PROMOTED_PRIORITY: i64 = 1_000_000;

/// Optional deployment capability invoked after completion
#[async_trait]
pub trait DeploymentTrigger: Send + Sync {
    async fn trigger(&self, path: &Path, branch: &str) -> eyre::Result<bool>;
}

/// Runs the hand-off steps between a completed project and the next one
pub struct HandoffRunner {
    store: Arc<Store>,
    gitops: Arc<dyn GitOps>,
    state: Arc<StateEngine>,
    deployment: Option<Arc<dyn DeploymentTrigger>>,
    http: reqwest::Client,
    config: HandoffConfig,
    emitter: EventEmitter,
}

impl HandoffRunner {
    pub fn new(
        store: Arc<Store>,
        gitops: Arc<dyn GitOps>,
        state: Arc<StateEngine>,
        deployment: Option<Arc<dyn DeploymentTrigger>>,
        config: HandoffConfig,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            store,
            gitops,
            state,
            deployment,
            http: reqwest::Client::new(),
            config,
            emitter,
        }
    }

    /// Finalize `completed` and promote `next`
    pub async fn run(&self, completed: &Project, next: &Project) -> eyre::Result<()> {
        let path = Path::new(&completed.local_path);

        // 1. Completion tag
        let tag = format!("midnight-complete-{}", Utc::now().format("%Y-%m-%d"));
        if let Err(e) = self.gitops.create_tag(path, &tag, "Completed by Midnight").await {
            warn!(project_id = %completed.id, error = %e, "Completion tag failed");
        }

        // 2. Persist completion and take the final snapshot
        self.store.update_project_status(&completed.id, ProjectStatus::Completed)?;
        if let Err(e) = self.state.save_snapshot(&completed.id).await {
            warn!(project_id = %completed.id, error = %e, "Final snapshot failed");
        }

        // 3. Push
        if self.config.push_to_remote {
            match self.gitops.get_current_branch(path).await {
                Ok(branch) => {
                    if let Err(e) = self.gitops.push(path, "origin", &branch).await {
                        warn!(project_id = %completed.id, error = %e, "Push to origin failed");
                    }
                }
                Err(e) => warn!(project_id = %completed.id, error = %e, "Could not resolve branch for push"),
            }
        }

        // 4. Deployment
        if self.config.trigger_deployment {
            if let Some(deployment) = &self.deployment {
                let branch = self
                    .gitops
                    .get_current_branch(path)
                    .await
                    .unwrap_or_else(|_| "main".to_string());
                match deployment.trigger(path, &branch).await {
                    Ok(ok) => info!(project_id = %completed.id, ok, "Deployment triggered"),
                    Err(e) => warn!(project_id = %completed.id, error = %e, "Deployment trigger failed"),
                }
            }
        }

        // 5. Worktree cleanup
        if self.config.cleanup_worktrees {
            if let Err(e) = self.gitops.clean_worktrees(path).await {
                warn!(project_id = %completed.id, error = %e, "Worktree cleanup failed");
            }
        }

        // 6. Webhook
        if let Some(url) = &self.config.notify_webhook {
            self.post_webhook(url, completed, next).await;
        }

        // 7. Promote the next project
        self.store.update_project_status(&next.id, ProjectStatus::Queued)?;
        self.store.reorder_project(&next.id, PROMOTED_PRIORITY)?;

        // 8. Announce
        self.emitter.emit(Event::HandoffTriggered {
            from_project: completed.id.clone(),
            to_project: next.id.clone(),
        });

        info!(from = %completed.id, to = %next.id, "Hand-off complete");
        Ok(())
    }

    async fn post_webhook(&self, url: &str, completed: &Project, next: &Project) {
        let payload = serde_json::json!({
            "type": "project_handoff",
            "timestamp": crate::domain::now_ms(),
            "completed": {
                "id": completed.id,
                "name": completed.name,
                "path": completed.local_path,
            },
            "next": {
                "id": next.id,
                "name": next.name,
                "path": next.local_path,
            },
        });

        match self.http.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(url, "Hand-off webhook delivered");
            }
            Ok(response) => {
                warn!(url, status = response.status().as_u16(), "Hand-off webhook rejected");
            }
            Err(e) => {
                warn!(url, error = %e, "Hand-off webhook failed");
            }
        }
    }
}
