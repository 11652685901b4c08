//! RepoMapProvider capability
//!
//! The symbol-graph producer is external; the core only needs a text
//! summary to hand the Sentinel. The in-tree fallback walks the project and
//! lists source files.

use std::path::Path;

use async_trait::async_trait;
use eyre::Result;
use walkdir::WalkDir;

/// Produces a text summary of a repository for the Sentinel
#[async_trait]
pub trait RepoMapProvider: Send + Sync {
    async fn get_repo_map(&self, project_path: &Path) -> Result<String>;
}

/// Fallback provider: a flat file listing with sizes
pub struct FileListingRepoMap {
    /// Cap on listed files to keep the prompt bounded
    max_files: usize,
}

impl FileListingRepoMap {
    pub fn new() -> Self {
        Self { max_files: 200 }
    }

    fn is_hidden(entry: &walkdir::DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
    }
}

impl Default for FileListingRepoMap {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoMapProvider for FileListingRepoMap {
    async fn get_repo_map(&self, project_path: &Path) -> Result<String> {
        let mut lines = vec!["# Repository files".to_string()];
        let mut count = 0usize;
        let mut truncated = false;

        for entry in WalkDir::new(project_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !Self::is_hidden(e) || e.depth() == 0)
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if count >= self.max_files {
                truncated = true;
                break;
            }
            let relative = entry.path().strip_prefix(project_path).unwrap_or(entry.path());
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            lines.push(format!("{} ({} bytes)", relative.display(), size));
            count += 1;
        }

        if truncated {
            lines.push(format!("... truncated at {} files", self.max_files));
        }
        Ok(lines.join("\n"))
    }
}
