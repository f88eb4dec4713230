use std::path::PathBuf;
use thiserror::Error;

use crate::action::ActionError;
use crate::db::StoreError;
use crate::ledger::LedgerError;
use crate::logging::LoggingError;
use crate::meta::MetaSourceError;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Metadata source error: {0}")]
    MetaSource(#[from] MetaSourceError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, MigrationError>;
