//! Subscriber setup for processes embedding the ledger.
//!
//! The library itself only logs through the `log` facade. [`init`] routes
//! those records into a `tracing` subscriber filtered by `RUST_LOG`.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("Failed to install subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber.
///
/// `default_level` is used when `RUST_LOG` is unset. Returns `Ok(false)` if
/// logging was already initialised by an earlier call.
pub fn init(default_level: &str, format: LogFormat) -> Result<bool, LoggingError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }

    if let Err(e) = install(default_level, format) {
        INITIALIZED.store(false, Ordering::SeqCst);
        return Err(e);
    }
    Ok(true)
}

fn install(default_level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true)),
        )?,
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_current_span(false)),
        )?,
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}
