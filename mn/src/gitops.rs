//! GitOps capability
//!
//! Low-level git operations consumed by recovery and hand-off. The core
//! depends only on the trait; the in-tree implementation shells out to the
//! git CLI.

use std::path::Path;

use async_trait::async_trait;
use eyre::{Result, eyre};
use tokio::process::Command;
use tracing::{debug, info};

/// Git driver capability
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Name of the currently checked-out branch
    async fn get_current_branch(&self, path: &Path) -> Result<String>;

    /// Push a branch to a remote
    async fn push(&self, path: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Create an annotated tag
    async fn create_tag(&self, path: &Path, tag: &str, message: &str) -> Result<()>;

    /// Prune stale worktree records
    async fn clean_worktrees(&self, path: &Path) -> Result<()>;

    /// Hard-reset the working tree to a hash
    async fn hard_reset(&self, path: &Path, hash: &str) -> Result<()>;

    /// Remove untracked files and directories
    async fn clean_untracked(&self, path: &Path) -> Result<()>;

    /// Current HEAD hash
    async fn head_hash(&self, path: &Path) -> Result<String>;
}

/// GitOps implementation shelling out to the git CLI
pub struct CommandGitOps;

impl CommandGitOps {
    async fn git(path: &Path, args: &[&str]) -> Result<String> {
        debug!(?args, path = %path.display(), "CommandGitOps::git");
        let output = Command::new("git").args(args).current_dir(path).output().await?;
        if !output.status.success() {
            return Err(eyre!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl GitOps for CommandGitOps {
    async fn get_current_branch(&self, path: &Path) -> Result<String> {
        Self::git(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn push(&self, path: &Path, remote: &str, branch: &str) -> Result<()> {
        info!(remote, branch, "Pushing branch");
        Self::git(path, &["push", remote, branch]).await?;
        Ok(())
    }

    async fn create_tag(&self, path: &Path, tag: &str, message: &str) -> Result<()> {
        Self::git(path, &["tag", "-a", tag, "-m", message]).await?;
        Ok(())
    }

    async fn clean_worktrees(&self, path: &Path) -> Result<()> {
        Self::git(path, &["worktree", "prune"]).await?;
        Ok(())
    }

    async fn hard_reset(&self, path: &Path, hash: &str) -> Result<()> {
        Self::git(path, &["reset", "--hard", hash]).await?;
        Ok(())
    }

    async fn clean_untracked(&self, path: &Path) -> Result<()> {
        Self::git(path, &["clean", "-fd"]).await?;
        Ok(())
    }

    async fn head_hash(&self, path: &Path) -> Result<String> {
        Self::git(path, &["rev-parse", "HEAD"]).await
    }
}
