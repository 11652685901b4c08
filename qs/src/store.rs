//! The durable store
//!
//! Synchronous SQLite-backed store. Writes are serialized behind an internal
//! mutex and durable before the call returns (WAL + synchronous=FULL).
//! Concurrent readers never observe a partially written row.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::project::{Project, ProjectDna, ProjectStatus};
use crate::schema::ensure_schema;
use crate::snapshot::{Cooldown, StateSnapshot};
use crate::task::{AssignedAgent, Task, TaskResult, TaskStatus};
use crate::verdict::SentinelVerdict;
use crate::{generate_id, now_ms};

/// Snapshots retained per project; older ones are deleted FIFO
pub const SNAPSHOT_RETENTION: usize = 20;

/// Fields for creating a task; the store assigns id and created_at
#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: String,
    pub description: String,
    pub priority: i64,
    pub dependencies: Vec<String>,
    pub assigned_agent: AssignedAgent,
}

/// Partial update of a task row. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub assigned_agent: Option<AssignedAgent>,
    pub worktree_path: Option<Option<String>>,
    pub started_at: Option<Option<i64>>,
    pub completed_at: Option<Option<i64>>,
    pub result: Option<Option<TaskResult>>,
    pub retry_count: Option<u32>,
}

/// Aggregate queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct QueueStats {
    pub total: u64,
    pub queued: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub avg_completion_ms: Option<f64>,
}

/// A structured execution-log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub level: String,
    pub source: String,
    pub message: String,
    pub context: Option<serde_json::Value>,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
}

/// The durable queue and task store
pub struct Store {
    conn: Mutex<Connection>,
    // Held for the lifetime of the store so a second daemon cannot open it
    _lock: Option<std::fs::File>,
}

impl Store {
    /// Open or create the store at `path` (a directory).
    ///
    /// Takes an exclusive advisory lock beside the database; a second open
    /// of the same store fails rather than corrupting writes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref();
        std::fs::create_dir_all(dir)?;

        let lock_path = dir.join("queue.lock");
        let lock_file = std::fs::File::create(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked(lock_path.display().to_string()))?;

        let db_path = dir.join("queue.db");
        let conn = Connection::open(&db_path)?;
        ensure_schema(&conn)?;

        info!(path = %db_path.display(), "Opened queue store");
        Ok(Self {
            conn: Mutex::new(conn),
            _lock: Some(lock_file),
        })
    }

    /// Open the store without the daemon's exclusive lock.
    ///
    /// For CLI access while a daemon may be running; SQLite's own locking
    /// still serializes cross-process writes.
    pub fn open_shared(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref();
        std::fs::create_dir_all(dir)?;

        let conn = Connection::open(dir.join("queue.db"))?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            _lock: None,
        })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            _lock: None,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // === Projects ===

    /// Add a project to the queue. The display name is the last path
    /// component; initial status is queued.
    pub fn add_project(&self, local_path: &str, priority: i64) -> Result<Project> {
        let name = Path::new(local_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| local_path.to_string());
        let project = Project::new(name, local_path, priority);

        let conn = self.lock();
        conn.execute(
            "INSERT INTO projects (id, name, repo_url, local_path, status, priority, created_at, \
             started_at, completed_at, current_task_id, git_hash, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                project.id,
                project.name,
                project.repo_url,
                project.local_path,
                project.status.to_string(),
                project.priority,
                project.created_at,
                project.started_at,
                project.completed_at,
                project.current_task_id,
                project.git_hash,
                project.error_message,
            ],
        )?;

        debug!(project_id = %project.id, priority, "Added project");
        Ok(project)
    }

    /// Delete a project and all dependent rows (cascade)
    pub fn remove_project(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        debug!(project_id = %id, removed = n > 0, "Removed project");
        Ok(n > 0)
    }

    /// Fetch a project by id
    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM projects WHERE id = ?1", params![id], project_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// All projects, newest first
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], project_from_row)?;
        Ok(collect_rows(rows, "projects"))
    }

    /// Highest-priority queued project; ties broken by earliest created_at
    pub fn next_project(&self) -> Result<Option<Project>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM projects WHERE status = 'queued' \
             ORDER BY priority DESC, created_at ASC LIMIT 1",
            [],
            project_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Update a project's status, enforcing the phase graph.
    ///
    /// Entering loading or building stamps started_at (first time only);
    /// entering completed or failed stamps completed_at.
    pub fn update_project_status(&self, id: &str, status: ProjectStatus) -> Result<()> {
        let current = self
            .get_project(id)?
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))?;

        if !current.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        self.write_project_status(&current, status)
    }

    /// Set a project's status without transition validation (recovery only)
    pub fn restore_project_status(&self, id: &str, status: ProjectStatus) -> Result<()> {
        let current = self
            .get_project(id)?
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))?;
        self.write_project_status(&current, status)
    }

    fn write_project_status(&self, current: &Project, status: ProjectStatus) -> Result<()> {
        let now = now_ms();
        let started_at = match status {
            ProjectStatus::Loading | ProjectStatus::Building => Some(current.started_at.unwrap_or(now)),
            _ => current.started_at,
        };
        let completed_at = match status {
            ProjectStatus::Completed | ProjectStatus::Failed => Some(now),
            _ => current.completed_at,
        };

        let conn = self.lock();
        conn.execute(
            "UPDATE projects SET status = ?2, started_at = ?3, completed_at = ?4 WHERE id = ?1",
            params![current.id, status.to_string(), started_at, completed_at],
        )?;
        debug!(project_id = %current.id, from = %current.status, to = %status, "Project status updated");
        Ok(())
    }

    /// Update a project's dispatch priority
    pub fn reorder_project(&self, id: &str, new_priority: i64) -> Result<()> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE projects SET priority = ?2 WHERE id = ?1",
            params![id, new_priority],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("project {}", id)));
        }
        Ok(())
    }

    /// Record the project's last error message
    pub fn set_project_error(&self, id: &str, message: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE projects SET error_message = ?2 WHERE id = ?1",
            params![id, message],
        )?;
        Ok(())
    }

    /// Record the project's last verified git hash
    pub fn set_project_git_hash(&self, id: &str, git_hash: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE projects SET git_hash = ?2 WHERE id = ?1",
            params![id, git_hash],
        )?;
        Ok(())
    }

    /// Record which task the project is currently driving
    pub fn set_current_task(&self, id: &str, task_id: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE projects SET current_task_id = ?2 WHERE id = ?1",
            params![id, task_id],
        )?;
        Ok(())
    }

    // === DNA ===

    /// Store (or overwrite) a project's DNA
    pub fn store_dna(&self, project_id: &str, dna: &ProjectDna) -> Result<()> {
        let stacks = serde_json::json!({
            "runtime": dna.tech_stack,
            "dev": dna.dev_stack,
        });

        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO project_dna (project_id, idea_md, tech_stack_json, definition_of_done_md) \
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, dna.idea, stacks.to_string(), dna.definition_of_done],
        )?;
        debug!(%project_id, "Stored project DNA");
        Ok(())
    }

    /// Fetch a project's DNA
    pub fn get_dna(&self, project_id: &str) -> Result<Option<ProjectDna>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT idea_md, tech_stack_json, definition_of_done_md FROM project_dna WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((idea, stacks_json, done)) => {
                let stacks: serde_json::Value = serde_json::from_str(&stacks_json)?;
                let parse_stack = |key: &str| -> BTreeMap<String, String> {
                    stacks
                        .get(key)
                        .and_then(|v| serde_json::from_value(v.clone()).ok())
                        .unwrap_or_default()
                };
                Ok(Some(ProjectDna {
                    idea,
                    tech_stack: parse_stack("runtime"),
                    dev_stack: parse_stack("dev"),
                    definition_of_done: done,
                }))
            }
        }
    }

    // === Tasks ===

    /// Insert a task with a fresh id
    pub fn add_task(&self, new: NewTask) -> Result<Task> {
        let mut task = Task::new(&new.project_id, &new.description, new.priority);
        task.dependencies = new.dependencies;
        task.assigned_agent = new.assigned_agent;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO tasks (id, project_id, description, status, assigned_agent, priority, \
             dependencies, worktree_path, created_at, started_at, completed_at, result_json, retry_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                task.id,
                task.project_id,
                task.description,
                task.status.to_string(),
                task.assigned_agent.to_string(),
                task.priority,
                serde_json::to_string(&task.dependencies)?,
                task.worktree_path,
                task.created_at,
                task.started_at,
                task.completed_at,
                Option::<String>::None,
                task.retry_count,
            ],
        )?;

        debug!(task_id = %task.id, project_id = %task.project_id, "Added task");
        Ok(task)
    }

    /// Fetch a task by id
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.lock();
        let row = conn
            .query_row("SELECT * FROM tasks WHERE id = ?1", params![id], task_row_raw)
            .optional()?;
        match row {
            None => Ok(None),
            Some(raw) => Ok(Some(task_from_raw(raw)?)),
        }
    }

    /// All tasks of a project, ordered by priority desc then created_at asc
    pub fn project_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks WHERE project_id = ?1 ORDER BY priority DESC, created_at ASC",
        )?;
        let rows = stmt.query_map(params![project_id], task_row_raw)?;

        let mut tasks = Vec::new();
        for row in rows {
            match row {
                Ok(raw) => match task_from_raw(raw) {
                    Ok(task) => tasks.push(task),
                    Err(e) => warn!(error = %e, "Skipping corrupt task row"),
                },
                Err(e) => warn!(error = %e, "Skipping unreadable task row"),
            }
        }
        Ok(tasks)
    }

    /// Apply a partial update to a task row atomically
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<()> {
        let mut task = self
            .get_task(id)?
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;

        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(agent) = patch.assigned_agent {
            task.assigned_agent = agent;
        }
        if let Some(worktree) = patch.worktree_path {
            task.worktree_path = worktree;
        }
        if let Some(started) = patch.started_at {
            task.started_at = started;
        }
        if let Some(completed) = patch.completed_at {
            task.completed_at = completed;
        }
        if let Some(result) = patch.result {
            task.result = result;
        }
        if let Some(retries) = patch.retry_count {
            task.retry_count = retries;
        }

        let result_json = match &task.result {
            Some(r) => Some(serde_json::to_string(r)?),
            None => None,
        };

        let conn = self.lock();
        conn.execute(
            "UPDATE tasks SET status = ?2, assigned_agent = ?3, worktree_path = ?4, \
             started_at = ?5, completed_at = ?6, result_json = ?7, retry_count = ?8 WHERE id = ?1",
            params![
                task.id,
                task.status.to_string(),
                task.assigned_agent.to_string(),
                task.worktree_path,
                task.started_at,
                task.completed_at,
                result_json,
                task.retry_count,
            ],
        )?;
        debug!(task_id = %id, status = %task.status, "Task updated");
        Ok(())
    }

    // === Snapshots ===

    /// Persist a snapshot and prune all but the most recent
    /// [`SNAPSHOT_RETENTION`] for the project, in one transaction
    pub fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        let agent_state = serde_json::to_string(&snapshot.agent_state)?;
        let trace = serde_json::to_string(&snapshot.reasoning_trace)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO state_snapshots (id, project_id, git_hash, agent_state_json, reasoning_trace, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.id,
                snapshot.project_id,
                snapshot.git_hash,
                agent_state,
                trace,
                snapshot.created_at,
            ],
        )?;
        tx.execute(
            "DELETE FROM state_snapshots WHERE project_id = ?1 AND id NOT IN \
             (SELECT id FROM state_snapshots WHERE project_id = ?1 \
              ORDER BY created_at DESC, id DESC LIMIT ?2)",
            params![snapshot.project_id, SNAPSHOT_RETENTION as i64],
        )?;
        tx.commit()?;

        debug!(snapshot_id = %snapshot.id, project_id = %snapshot.project_id, "Saved snapshot");
        Ok(())
    }

    /// Fetch a snapshot by id
    pub fn get_snapshot(&self, id: &str) -> Result<Option<StateSnapshot>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT * FROM state_snapshots WHERE id = ?1",
                params![id],
                snapshot_row_raw,
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some(raw) => Ok(Some(snapshot_from_raw(raw)?)),
        }
    }

    /// Most recent snapshot for a project
    pub fn load_latest_snapshot(&self, project_id: &str) -> Result<Option<StateSnapshot>> {
        Ok(self.list_snapshots(project_id)?.into_iter().next())
    }

    /// All snapshots for a project, newest first
    pub fn list_snapshots(&self, project_id: &str) -> Result<Vec<StateSnapshot>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM state_snapshots WHERE project_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![project_id], snapshot_row_raw)?;

        let mut snapshots = Vec::new();
        for row in rows {
            match row {
                Ok(raw) => match snapshot_from_raw(raw) {
                    Ok(snap) => snapshots.push(snap),
                    Err(e) => warn!(error = %e, "Skipping corrupt snapshot row"),
                },
                Err(e) => warn!(error = %e, "Skipping unreadable snapshot row"),
            }
        }
        Ok(snapshots)
    }

    // === Verdicts ===

    /// Persist a sentinel verdict
    pub fn add_verdict(&self, verdict: &SentinelVerdict) -> Result<()> {
        let audit = serde_json::to_string(&verdict.audit_log)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sentinel_verdicts (id, task_id, quality_score, passed, thinking_effort, \
             audit_log_json, correction_directive, merkle_verification_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                verdict.id,
                verdict.task_id,
                verdict.quality_score as i64,
                verdict.passed,
                verdict.thinking_effort,
                audit,
                verdict.correction_directive,
                verdict.verification_hash,
                verdict.created_at,
            ],
        )?;
        Ok(())
    }

    /// All verdicts for a task, oldest first
    pub fn verdicts_for_task(&self, task_id: &str) -> Result<Vec<SentinelVerdict>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM sentinel_verdicts WHERE task_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![task_id], verdict_row_raw)?;
        Ok(collect_verdicts(rows))
    }

    /// All verdicts across a project's tasks, oldest first
    pub fn project_verdicts(&self, project_id: &str) -> Result<Vec<SentinelVerdict>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT v.* FROM sentinel_verdicts v JOIN tasks t ON v.task_id = t.id \
             WHERE t.project_id = ?1 ORDER BY v.created_at ASC, v.id ASC",
        )?;
        let rows = stmt.query_map(params![project_id], verdict_row_raw)?;
        Ok(collect_verdicts(rows))
    }

    // === Cooldowns ===

    /// Persist a cooldown record
    pub fn add_cooldown(&self, cooldown: &Cooldown) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO cooldowns (id, provider, started_at, resume_at, snapshot_id, reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cooldown.id,
                cooldown.provider,
                cooldown.started_at,
                cooldown.resume_at,
                cooldown.snapshot_id,
                cooldown.reason,
            ],
        )?;
        Ok(())
    }

    /// Cooldowns with resume_at strictly in the future
    pub fn active_cooldowns(&self, now: i64) -> Result<Vec<Cooldown>> {
        self.cooldowns_where("resume_at > ?1", now)
    }

    /// Cooldowns whose resume_at has passed
    pub fn expired_cooldowns(&self, now: i64) -> Result<Vec<Cooldown>> {
        self.cooldowns_where("resume_at <= ?1", now)
    }

    fn cooldowns_where(&self, predicate: &str, now: i64) -> Result<Vec<Cooldown>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT id, provider, started_at, resume_at, snapshot_id, reason \
             FROM cooldowns WHERE {} ORDER BY resume_at ASC",
            predicate
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![now], |row| {
            Ok(Cooldown {
                id: row.get(0)?,
                provider: row.get(1)?,
                started_at: row.get(2)?,
                resume_at: row.get(3)?,
                snapshot_id: row.get(4)?,
                reason: row.get(5)?,
            })
        })?;
        Ok(collect_rows(rows, "cooldowns"))
    }

    /// Delete a cooldown row
    pub fn remove_cooldown(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM cooldowns WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // === Execution log & metrics ===

    /// Append a structured log row
    pub fn append_log(&self, entry: &LogEntry) -> Result<()> {
        let context = match &entry.context {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO execution_log (timestamp, level, source, message, context_json, project_id, task_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.timestamp,
                entry.level,
                entry.source,
                entry.message,
                context,
                entry.project_id,
                entry.task_id,
            ],
        )?;
        Ok(())
    }

    /// Most recent log rows, newest first
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, level, source, message, context_json, project_id, task_id \
             FROM execution_log ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(LogEntry {
                timestamp: row.get(0)?,
                level: row.get(1)?,
                source: row.get(2)?,
                message: row.get(3)?,
                context: row
                    .get::<_, Option<String>>(4)?
                    .and_then(|s| serde_json::from_str(&s).ok()),
                project_id: row.get(5)?,
                task_id: row.get(6)?,
            })
        })?;
        Ok(collect_rows(rows, "execution_log"))
    }

    /// Record a named metric sample
    pub fn record_metric(
        &self,
        name: &str,
        value: f64,
        project_id: Option<&str>,
        tags: Option<&serde_json::Value>,
    ) -> Result<()> {
        let tags_json = match tags {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO metrics (timestamp, metric_name, metric_value, project_id, tags_json) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![now_ms(), name, value, project_id, tags_json],
        )?;
        Ok(())
    }

    // === Stats ===

    /// Aggregate queue statistics
    pub fn stats(&self) -> Result<QueueStats> {
        let conn = self.lock();
        let count = |predicate: &str| -> Result<u64> {
            let sql = format!("SELECT count(*) FROM projects WHERE {}", predicate);
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        let total: i64 = conn.query_row("SELECT count(*) FROM projects", [], |row| row.get(0))?;
        let avg_completion_ms: Option<f64> = conn.query_row(
            "SELECT avg(completed_at - started_at) FROM projects \
             WHERE status = 'completed' AND started_at IS NOT NULL AND completed_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(QueueStats {
            total: total as u64,
            queued: count("status = 'queued'")?,
            in_progress: count("status IN ('loading', 'planning', 'building', 'verifying')")?,
            completed: count("status = 'completed'")?,
            failed: count("status = 'failed'")?,
            avg_completion_ms,
        })
    }
}

// === Row mapping ===

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let status_str: String = row.get("status")?;
    let status = status_str.parse().unwrap_or(ProjectStatus::Failed);
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        repo_url: row.get("repo_url")?,
        local_path: row.get("local_path")?,
        status,
        priority: row.get("priority")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        current_task_id: row.get("current_task_id")?,
        git_hash: row.get("git_hash")?,
        error_message: row.get("error_message")?,
    })
}

// Raw tuples carry JSON columns out of the rusqlite closure so serde errors
// surface as StoreError::CorruptRow instead of aborting the whole query.

type TaskRowRaw = (Task, String, Option<String>);

fn task_row_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRowRaw> {
    let status_str: String = row.get("status")?;
    let agent_str: String = row.get("assigned_agent")?;
    let task = Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        description: row.get("description")?,
        status: status_str.parse().unwrap_or(TaskStatus::Failed),
        assigned_agent: if agent_str == "sentinel" {
            AssignedAgent::Sentinel
        } else {
            AssignedAgent::Actor
        },
        priority: row.get("priority")?,
        dependencies: Vec::new(),
        worktree_path: row.get("worktree_path")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        result: None,
        retry_count: row.get("retry_count")?,
    };
    let deps: String = row.get("dependencies")?;
    let result_json: Option<String> = row.get("result_json")?;
    Ok((task, deps, result_json))
}

fn task_from_raw((mut task, deps, result_json): TaskRowRaw) -> Result<Task> {
    task.dependencies = serde_json::from_str(&deps).map_err(|e| StoreError::CorruptRow {
        table: "tasks".to_string(),
        reason: format!("dependencies: {}", e),
    })?;
    if let Some(json) = result_json {
        task.result = Some(serde_json::from_str(&json).map_err(|e| StoreError::CorruptRow {
            table: "tasks".to_string(),
            reason: format!("result_json: {}", e),
        })?);
    }
    Ok(task)
}

type SnapshotRowRaw = (String, String, String, String, String, i64);

fn snapshot_row_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRowRaw> {
    Ok((
        row.get("id")?,
        row.get("project_id")?,
        row.get("git_hash")?,
        row.get("agent_state_json")?,
        row.get("reasoning_trace")?,
        row.get("created_at")?,
    ))
}

fn snapshot_from_raw(
    (id, project_id, git_hash, agent_state, trace, created_at): SnapshotRowRaw,
) -> Result<StateSnapshot> {
    let corrupt = |field: &str, e: serde_json::Error| StoreError::CorruptRow {
        table: "state_snapshots".to_string(),
        reason: format!("{}: {}", field, e),
    };
    Ok(StateSnapshot {
        id,
        project_id,
        git_hash,
        agent_state: serde_json::from_str(&agent_state).map_err(|e| corrupt("agent_state_json", e))?,
        reasoning_trace: serde_json::from_str(&trace).map_err(|e| corrupt("reasoning_trace", e))?,
        created_at,
    })
}

type VerdictRowRaw = (SentinelVerdict, String);

fn verdict_row_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<VerdictRowRaw> {
    let verdict = SentinelVerdict {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        quality_score: row.get::<_, i64>("quality_score")?.clamp(0, 100) as u8,
        passed: row.get("passed")?,
        thinking_effort: row.get("thinking_effort")?,
        audit_log: Default::default(),
        correction_directive: row.get("correction_directive")?,
        verification_hash: row.get("merkle_verification_hash")?,
        created_at: row.get("created_at")?,
    };
    let audit: String = row.get("audit_log_json")?;
    Ok((verdict, audit))
}

fn verdict_from_raw((mut verdict, audit): VerdictRowRaw) -> Result<SentinelVerdict> {
    verdict.audit_log = serde_json::from_str(&audit).map_err(|e| StoreError::CorruptRow {
        table: "sentinel_verdicts".to_string(),
        reason: format!("audit_log_json: {}", e),
    })?;
    Ok(verdict)
}

fn collect_verdicts(rows: impl Iterator<Item = rusqlite::Result<VerdictRowRaw>>) -> Vec<SentinelVerdict> {
    let mut verdicts = Vec::new();
    for row in rows {
        match row {
            Ok(raw) => match verdict_from_raw(raw) {
                Ok(v) => verdicts.push(v),
                Err(e) => warn!(error = %e, "Skipping corrupt verdict row"),
            },
            Err(e) => warn!(error = %e, "Skipping unreadable verdict row"),
        }
    }
    verdicts
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>, table: &str) -> Vec<T> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(v) => out.push(v),
            Err(e) => warn!(table, error = %e, "Skipping unreadable row"),
        }
    }
    out
}
