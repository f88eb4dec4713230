//! Asynchronously executed units of migration work.
//!
//! An action's progress is tracked independently of the ledger: the
//! scheduler polls [`Action::is_finished`] and, once it is, calls
//! [`Action::finish`] to settle the outcome into the action's state.

use async_trait::async_trait;
use thiserror::Error;

pub mod executor;
pub mod progress;
pub mod sql;

pub use executor::{SqlActionInfo, SqlExecutor, SqlRequest, SqlResult, SqlRows};
pub use progress::ActionProgress;
pub use sql::SqlAction;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Action not executed, actionId: {0}")]
    NotExecuted(String),

    #[error("Action already executed, actionId: {0}")]
    AlreadyExecuted(String),

    /// The statement itself failed.
    #[error("Execution failed: {0}")]
    Executor(String),

    #[error("Execution cancelled")]
    Cancelled,
}

#[async_trait]
pub trait Action: Send {
    fn id(&self) -> &str;

    fn progress(&self) -> ActionProgress;

    /// Starts the work without waiting for it. Callable once.
    fn execute(&mut self) -> Result<(), ActionError>;

    /// Non-blocking completion check. Errors if the action never ran.
    fn is_finished(&self) -> Result<bool, ActionError>;

    /// Waits for the work and records the outcome in [`Action::progress`].
    /// Execution failures never surface here; only misuse does.
    async fn finish(&mut self) -> Result<(), ActionError>;

    /// Best-effort request to abandon the work.
    fn stop(&mut self);
}
