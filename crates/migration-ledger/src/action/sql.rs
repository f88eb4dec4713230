use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::{Action, ActionError, ActionProgress, SqlActionInfo, SqlExecutor, SqlRequest, SqlResult};

/// A single SQL statement run through a [`SqlExecutor`].
pub struct SqlAction {
    id: String,
    sql: String,
    settings: BTreeMap<String, String>,
    executor: Arc<dyn SqlExecutor>,
    info: Arc<SqlActionInfo>,
    progress: ActionProgress,
    handle: Option<JoinHandle<SqlResult>>,
    error: Option<ActionError>,
}

impl SqlAction {
    pub fn new(
        id: impl Into<String>,
        sql: impl Into<String>,
        settings: BTreeMap<String, String>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
            settings,
            executor,
            info: Arc::new(SqlActionInfo::new()),
            progress: ActionProgress::Created,
            handle: None,
            error: None,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    pub fn info(&self) -> &Arc<SqlActionInfo> {
        &self.info
    }

    /// Why the action failed, once it has.
    pub fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }
}

#[async_trait]
impl Action for SqlAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn progress(&self) -> ActionProgress {
        self.progress
    }

    fn execute(&mut self) -> Result<(), ActionError> {
        if self.progress != ActionProgress::Created {
            return Err(ActionError::AlreadyExecuted(self.id.clone()));
        }
        self.progress = ActionProgress::Running;

        let request = SqlRequest {
            sql: self.sql.clone(),
            settings: self.settings.clone(),
            action_id: self.id.clone(),
        };
        self.handle = Some(self.executor.execute(request, Arc::clone(&self.info)));
        log::info!("Action submitted, actionId: {}", self.id);
        Ok(())
    }

    fn is_finished(&self) -> Result<bool, ActionError> {
        if self.progress.is_terminal() {
            return Ok(true);
        }
        match &self.handle {
            Some(handle) => Ok(handle.is_finished()),
            None => Err(ActionError::NotExecuted(self.id.clone())),
        }
    }

    async fn finish(&mut self) -> Result<(), ActionError> {
        if self.progress.is_terminal() {
            return Ok(());
        }
        let handle = self
            .handle
            .take()
            .ok_or_else(|| ActionError::NotExecuted(self.id.clone()))?;

        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ActionError::Cancelled),
            Err(e) => Err(ActionError::Executor(format!("execution task panicked: {}", e))),
        };

        match outcome {
            Ok(rows) => {
                self.info.set_result(rows);
                self.progress = ActionProgress::Succeeded;
                log::info!("Action succeeded, actionId: {}", self.id);
            }
            Err(e) => {
                log::error!("Action failed, actionId: {}, cause: {}", self.id, e);
                self.error = Some(e);
                self.progress = ActionProgress::Failed;
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
            log::info!("Action stop requested, actionId: {}", self.id);
        }
    }
}
