//! SQLite schema and migrations

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Schema version stamped into `user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Full schema. All foreign keys cascade on delete; indices cover the
/// status, priority, created_at, and foreign-key columns used by the
/// dispatch and recovery queries.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    repo_url        TEXT,
    local_path      TEXT NOT NULL,
    status          TEXT NOT NULL,
    priority        INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL,
    started_at      INTEGER,
    completed_at    INTEGER,
    current_task_id TEXT,
    git_hash        TEXT,
    error_message   TEXT
);
CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status);
CREATE INDEX IF NOT EXISTS idx_projects_priority ON projects(priority);
CREATE INDEX IF NOT EXISTS idx_projects_created_at ON projects(created_at);

CREATE TABLE IF NOT EXISTS project_dna (
    project_id            TEXT PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    idea_md               TEXT NOT NULL,
    tech_stack_json       TEXT NOT NULL,
    definition_of_done_md TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id             TEXT PRIMARY KEY,
    project_id     TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    description    TEXT NOT NULL,
    status         TEXT NOT NULL,
    assigned_agent TEXT NOT NULL,
    priority       INTEGER NOT NULL DEFAULT 0,
    dependencies   TEXT NOT NULL DEFAULT '[]',
    worktree_path  TEXT,
    created_at     INTEGER NOT NULL,
    started_at     INTEGER,
    completed_at   INTEGER,
    result_json    TEXT,
    retry_count    INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);
CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);

CREATE TABLE IF NOT EXISTS state_snapshots (
    id               TEXT PRIMARY KEY,
    project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    git_hash         TEXT NOT NULL,
    agent_state_json TEXT NOT NULL,
    reasoning_trace  TEXT NOT NULL DEFAULT '[]',
    created_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_project_id ON state_snapshots(project_id);
CREATE INDEX IF NOT EXISTS idx_snapshots_created_at ON state_snapshots(created_at);

CREATE TABLE IF NOT EXISTS sentinel_verdicts (
    id                       TEXT PRIMARY KEY,
    task_id                  TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    quality_score            INTEGER NOT NULL,
    passed                   INTEGER NOT NULL,
    thinking_effort          TEXT NOT NULL,
    audit_log_json           TEXT NOT NULL,
    correction_directive     TEXT,
    merkle_verification_hash TEXT NOT NULL,
    created_at               INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_verdicts_task_id ON sentinel_verdicts(task_id);
CREATE INDEX IF NOT EXISTS idx_verdicts_created_at ON sentinel_verdicts(created_at);

CREATE TABLE IF NOT EXISTS cooldowns (
    id          TEXT PRIMARY KEY,
    provider    TEXT NOT NULL,
    started_at  INTEGER NOT NULL,
    resume_at   INTEGER NOT NULL,
    snapshot_id TEXT REFERENCES state_snapshots(id) ON DELETE CASCADE,
    reason      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cooldowns_resume_at ON cooldowns(resume_at);

CREATE TABLE IF NOT EXISTS execution_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    INTEGER NOT NULL,
    level        TEXT NOT NULL,
    source       TEXT NOT NULL,
    message      TEXT NOT NULL,
    context_json TEXT,
    project_id   TEXT,
    task_id      TEXT
);
CREATE INDEX IF NOT EXISTS idx_log_timestamp ON execution_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_log_project_id ON execution_log(project_id);

CREATE TABLE IF NOT EXISTS metrics (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    INTEGER NOT NULL,
    metric_name  TEXT NOT NULL,
    metric_value REAL NOT NULL,
    project_id   TEXT,
    tags_json    TEXT
);
CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(metric_name);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);
"#;

/// Initialize or validate the schema on an open connection.
///
/// A fresh database gets the full schema and the current version stamp.
/// An existing database with a different version is rejected; schema
/// mismatch on open is fatal.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // journal_mode returns the resulting mode as a row
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version == 0 {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::info!(version = SCHEMA_VERSION, "Initialized store schema");
        return Ok(());
    }

    if version != SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            found: version,
            expected: SCHEMA_VERSION,
        });
    }

    Ok(())
}
