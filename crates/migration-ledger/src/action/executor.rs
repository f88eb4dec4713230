//! The execution collaborator for SQL actions.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use super::ActionError;

/// Rows returned by a statement, each column rendered as a string.
pub type SqlRows = Vec<Vec<String>>;

/// Outcome of an executed statement.
pub type SqlResult = Result<SqlRows, ActionError>;

/// One statement submitted for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlRequest {
    pub sql: String,
    pub settings: BTreeMap<String, String>,
    pub action_id: String,
}

/// Progress sink filled in by the executor while a statement runs.
#[derive(Debug, Default)]
pub struct SqlActionInfo {
    instance_id: Mutex<Option<String>>,
    logview: Mutex<Option<String>>,
    result: Mutex<Option<SqlRows>>,
}

impl SqlActionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_instance_id(&self, instance_id: impl Into<String>) {
        *guard(&self.instance_id) = Some(instance_id.into());
    }

    /// Id the execution backend assigned to the statement.
    pub fn instance_id(&self) -> Option<String> {
        guard(&self.instance_id).clone()
    }

    pub fn set_logview(&self, logview: impl Into<String>) {
        *guard(&self.logview) = Some(logview.into());
    }

    /// URL of the backend's log view for the statement.
    pub fn logview(&self) -> Option<String> {
        guard(&self.logview).clone()
    }

    pub fn set_result(&self, rows: SqlRows) {
        *guard(&self.result) = Some(rows);
    }

    pub fn result(&self) -> Option<SqlRows> {
        guard(&self.result).clone()
    }
}

// Plain values behind these locks, so a panic elsewhere leaves them usable.
fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs statements asynchronously.
///
/// `execute` must not block: it spawns the work and hands back the task.
/// The executor records what it learns about the run in `info`.
pub trait SqlExecutor: Send + Sync {
    fn execute(&self, request: SqlRequest, info: Arc<SqlActionInfo>) -> JoinHandle<SqlResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_starts_empty() {
        let info = SqlActionInfo::new();
        assert_eq!(info.instance_id(), None);
        assert_eq!(info.logview(), None);
        assert_eq!(info.result(), None);
    }

    #[test]
    fn test_info_records_values() {
        let info = SqlActionInfo::new();
        info.set_instance_id("20240101000000abc");
        info.set_logview("http://logview/abc");
        info.set_result(vec![vec!["1".to_string()]]);
        assert_eq!(info.instance_id().as_deref(), Some("20240101000000abc"));
        assert_eq!(info.logview().as_deref(), Some("http://logview/abc"));
        assert_eq!(info.result(), Some(vec![vec!["1".to_string()]]));
    }
}
