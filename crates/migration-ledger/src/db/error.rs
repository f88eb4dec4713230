//! Store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating the store directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A session lock was poisoned.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// No session became available before the acquire timeout.
    #[error("No store session available after {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    /// The session pool has been closed.
    #[error("Store session pool is closed")]
    PoolClosed,

    /// A persisted JSON column could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted status string is outside the known vocabulary.
    #[error("Unknown migration status '{0}'")]
    InvalidStatus(String),

    /// Neither a configured home directory nor the environment variable is set.
    #[error("Store home directory not configured and environment variable '{var}' not set")]
    MissingHome { var: &'static str },
}
