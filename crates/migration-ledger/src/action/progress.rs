use std::fmt;

use serde::Serialize;

/// Lifecycle of one action. Starts at `Created`; `Succeeded` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionProgress {
    #[default]
    Created,
    Running,
    Succeeded,
    Failed,
}

impl ActionProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionProgress::Created => "CREATED",
            ActionProgress::Running => "RUNNING",
            ActionProgress::Succeeded => "SUCCEEDED",
            ActionProgress::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionProgress::Succeeded | ActionProgress::Failed)
    }
}

impl fmt::Display for ActionProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
