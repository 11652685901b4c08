//! Store error types

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: i64, expected: i64 },

    #[error("Store is locked by another process: {0}")]
    Locked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
