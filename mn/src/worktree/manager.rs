//! Worktree manager
//!
//! Creates an isolated working copy per task attempt, computes diffs,
//! reverts failed attempts, and merges approved ones. No operation leaves
//! the parent tree in a merging or conflicted intermediate state.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Error types for worktree operations
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("Failed to create worktree: {0}")]
    CreateFailed(String),

    #[error("Failed to remove worktree: {0}")]
    RemoveFailed(String),

    #[error("Merge conflict for worktree: {0}")]
    MergeConflict(String),

    #[error("Worktree not found: {0}")]
    NotFound(String),

    #[error("Git command failed: {0}")]
    GitError(String),
}

/// Information about a created worktree
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    /// Path to the worktree
    pub path: PathBuf,

    /// Branch name (same as the worktree name)
    pub branch: String,

    /// Git hash of HEAD when the worktree was created
    pub start_hash: String,
}

/// Manager for per-attempt git worktrees
pub struct WorktreeManager {
    /// Base directory that worktrees are created under
    base_dir: PathBuf,
}

impl WorktreeManager {
    /// Create a manager placing worktrees under `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    async fn git(cwd: &Path, args: &[&str]) -> Result<std::process::Output, WorktreeError> {
        Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))
    }

    /// Create a worktree named `name` branching from the project's HEAD.
    ///
    /// Records the starting git hash so failed attempts can be reverted to
    /// a known-good point.
    pub async fn create(&self, project_path: &Path, name: &str) -> Result<WorktreeInfo, WorktreeError> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| WorktreeError::CreateFailed(format!("Failed to create base dir: {}", e)))?;

        let worktree_path = self.base_dir.join(name);
        let path_str = worktree_path
            .to_str()
            .ok_or_else(|| WorktreeError::CreateFailed("non-UTF-8 worktree path".to_string()))?;

        let output = Self::git(project_path, &["worktree", "add", path_str, "-b", name, "HEAD"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorktreeError::CreateFailed(stderr.to_string()));
        }

        let start_hash = Self::head_hash(&worktree_path).await?;
        info!(path = %worktree_path.display(), branch = name, "Created worktree");

        Ok(WorktreeInfo {
            path: worktree_path,
            branch: name.to_string(),
            start_hash,
        })
    }

    /// HEAD hash of a working tree
    pub async fn head_hash(worktree: &Path) -> Result<String, WorktreeError> {
        let output = Self::git(worktree, &["rev-parse", "HEAD"]).await?;
        if !output.status.success() {
            return Err(WorktreeError::GitError(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Concatenated staged-and-unstaged diff; `"(no changes)"` when empty
    pub async fn get_git_diff(&self, worktree: &Path) -> Result<String, WorktreeError> {
        // Intent-to-add so freshly created files appear in the unstaged diff
        let _ = Self::git(worktree, &["add", "-N", "."]).await;

        let unstaged = Self::git(worktree, &["diff"]).await?;
        let staged = Self::git(worktree, &["diff", "--staged"]).await?;

        let mut diff = String::new();
        diff.push_str(String::from_utf8_lossy(&staged.stdout).trim_end());
        let unstaged_text = String::from_utf8_lossy(&unstaged.stdout);
        if !unstaged_text.trim().is_empty() {
            if !diff.is_empty() {
                diff.push('\n');
            }
            diff.push_str(unstaged_text.trim_end());
        }

        if diff.is_empty() {
            Ok("(no changes)".to_string())
        } else {
            Ok(diff)
        }
    }

    /// Current branch of a working tree
    pub async fn current_branch(&self, path: &Path) -> Result<String, WorktreeError> {
        let output = Self::git(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if !output.status.success() {
            return Err(WorktreeError::GitError(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Commit any uncommitted changes in a worktree; no-op on a clean tree
    pub async fn auto_commit(&self, worktree: &Path, message: &str) -> Result<(), WorktreeError> {
        let status = Self::git(worktree, &["status", "--porcelain"]).await?;
        if status.stdout.is_empty() {
            return Ok(());
        }

        let add = Self::git(worktree, &["add", "-A"]).await?;
        if !add.status.success() {
            return Err(WorktreeError::GitError(
                String::from_utf8_lossy(&add.stderr).to_string(),
            ));
        }
        let commit = Self::git(worktree, &["commit", "-m", message]).await?;
        if !commit.status.success() {
            return Err(WorktreeError::GitError(
                String::from_utf8_lossy(&commit.stderr).to_string(),
            ));
        }
        debug!(worktree = %worktree.display(), "Auto-committed changes");
        Ok(())
    }

    /// Hard-reset the worktree to `to_hash` and clean untracked files
    pub async fn revert(&self, worktree: &Path, to_hash: &str) -> Result<(), WorktreeError> {
        if !worktree.exists() {
            return Err(WorktreeError::NotFound(worktree.display().to_string()));
        }

        let reset = Self::git(worktree, &["reset", "--hard", to_hash]).await?;
        if !reset.status.success() {
            return Err(WorktreeError::GitError(
                String::from_utf8_lossy(&reset.stderr).to_string(),
            ));
        }

        let clean = Self::git(worktree, &["clean", "-fd"]).await?;
        if !clean.status.success() {
            warn!(
                worktree = %worktree.display(),
                stderr = %String::from_utf8_lossy(&clean.stderr),
                "git clean failed after reset"
            );
        }

        info!(worktree = %worktree.display(), %to_hash, "Reverted worktree");
        Ok(())
    }

    /// Merge the worktree's branch into `target_branch` in the parent repo.
    ///
    /// Tries `git merge` from the parent tree; on failure aborts and falls
    /// back to checkout-then-merge. A conflicted merge is always aborted so
    /// the parent tree never stays in a merging state.
    pub async fn merge(
        &self,
        project_path: &Path,
        branch: &str,
        target_branch: &str,
    ) -> Result<(), WorktreeError> {
        let checkout = Self::git(project_path, &["checkout", target_branch]).await?;
        if !checkout.status.success() {
            return Err(WorktreeError::GitError(
                String::from_utf8_lossy(&checkout.stderr).to_string(),
            ));
        }

        let merge = Self::git(project_path, &["merge", "--no-ff", branch, "-m", &format!("Merge {}", branch)]).await?;
        if merge.status.success() {
            info!(branch, target_branch, "Merged worktree branch");
            return Ok(());
        }

        // Leave no conflicted state behind
        let _ = Self::git(project_path, &["merge", "--abort"]).await;
        debug!(branch, "Plain merge failed, retrying with --no-commit");

        let retry = Self::git(project_path, &["merge", "--no-commit", branch]).await?;
        if retry.status.success() {
            let commit = Self::git(project_path, &["commit", "-m", &format!("Merge {}", branch)]).await?;
            if commit.status.success() {
                info!(branch, target_branch, "Merged worktree branch (fallback)");
                return Ok(());
            }
        }
        let _ = Self::git(project_path, &["merge", "--abort"]).await;

        Err(WorktreeError::MergeConflict(branch.to_string()))
    }

    /// Remove a worktree and its branch record. Best-effort: failures warn
    /// rather than propagate.
    pub async fn delete(&self, project_path: &Path, name: &str) -> Result<(), WorktreeError> {
        let worktree_path = self.base_dir.join(name);

        if !worktree_path.exists() {
            warn!(path = %worktree_path.display(), "Worktree does not exist, skipping removal");
            return Ok(());
        }

        let path_str = worktree_path.to_string_lossy().to_string();
        let output = Self::git(project_path, &["worktree", "remove", &path_str, "--force"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("is not a working tree") {
                warn!(%stderr, "Failed to remove worktree");
            }
        }

        let _ = Self::git(project_path, &["branch", "-D", name]).await;
        info!(name, "Removed worktree");
        Ok(())
    }

    /// Path a worktree of this name would have
    pub fn worktree_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_git_repo(dir: &Path) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
            vec!["commit", "--allow-empty", "-m", "initial"],
        ] {
            Command::new("git").args(&args).current_dir(dir).output().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let manager = WorktreeManager::new(base.path());
        let info = manager.create(repo.path(), "midnight-task-1").await.unwrap();
        assert!(info.path.exists());
        assert_eq!(info.branch, "midnight-task-1");
        assert!(!info.start_hash.is_empty());

        manager.delete(repo.path(), "midnight-task-1").await.unwrap();
        assert!(!info.path.exists());
    }

    #[tokio::test]
    async fn test_diff_empty_tree() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let manager = WorktreeManager::new(base.path());
        let info = manager.create(repo.path(), "midnight-task-2").await.unwrap();

        let diff = manager.get_git_diff(&info.path).await.unwrap();
        assert_eq!(diff, "(no changes)");
    }

    #[tokio::test]
    async fn test_diff_includes_staged_and_unstaged() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_git_repo(repo.path()).await;
        std::fs::write(repo.path().join("a.txt"), "one\n").unwrap();
        Command::new("git")
            .args(["add", "-A"])
            .current_dir(repo.path())
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", "add a"])
            .current_dir(repo.path())
            .output()
            .await
            .unwrap();

        let manager = WorktreeManager::new(base.path());
        let info = manager.create(repo.path(), "midnight-task-3").await.unwrap();

        // One staged change and one unstaged change
        std::fs::write(info.path.join("a.txt"), "two\n").unwrap();
        Command::new("git")
            .args(["add", "a.txt"])
            .current_dir(&info.path)
            .output()
            .await
            .unwrap();
        std::fs::write(info.path.join("b.txt"), "fresh\n").unwrap();
        Command::new("git")
            .args(["add", "-N", "b.txt"])
            .current_dir(&info.path)
            .output()
            .await
            .unwrap();

        let diff = manager.get_git_diff(&info.path).await.unwrap();
        assert!(diff.contains("+two"));
        assert!(diff.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_revert_restores_tree() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let manager = WorktreeManager::new(base.path());
        let info = manager.create(repo.path(), "midnight-task-4").await.unwrap();

        std::fs::write(info.path.join("junk.txt"), "scratch").unwrap();
        manager.revert(&info.path, &info.start_hash).await.unwrap();

        assert!(!info.path.join("junk.txt").exists());
        let diff = manager.get_git_diff(&info.path).await.unwrap();
        assert_eq!(diff, "(no changes)");
    }

    #[tokio::test]
    async fn test_merge_into_main() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let manager = WorktreeManager::new(base.path());
        let info = manager.create(repo.path(), "midnight-task-5").await.unwrap();

        std::fs::write(info.path.join("feature.txt"), "done\n").unwrap();
        for args in [vec!["add", "-A"], vec!["commit", "-m", "feature"]] {
            Command::new("git")
                .args(&args)
                .current_dir(&info.path)
                .output()
                .await
                .unwrap();
        }

        manager.merge(repo.path(), "midnight-task-5", "main").await.unwrap();
        assert!(repo.path().join("feature.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        let manager = WorktreeManager::new(base.path());
        manager.delete(repo.path(), "never-created").await.unwrap();
    }

    #[tokio::test]
    async fn test_revert_missing_worktree_errors() {
        let base = tempdir().unwrap();
        let manager = WorktreeManager::new(base.path());
        let missing = base.path().join("ghost");
        let err = manager.revert(&missing, "HEAD").await.unwrap_err();
        assert!(matches!(err, WorktreeError::NotFound(_)));
    }
}
