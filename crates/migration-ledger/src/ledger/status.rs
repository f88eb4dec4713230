//! Migration status vocabulary and the transition rules applied on update.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::StoreError;

/// Status of a table job or a partition unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    /// Queued, eligible for dispatch.
    Pending,
    /// Dispatched, outcome not yet recorded.
    Running,
    Succeeded,
    /// Terminal once attempts exceed the retry limit.
    Failed,
}

impl MigrationStatus {
    pub const ALL: [MigrationStatus; 4] = [
        MigrationStatus::Pending,
        MigrationStatus::Running,
        MigrationStatus::Succeeded,
        MigrationStatus::Failed,
    ];

    /// The fixed string persisted in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "PENDING",
            MigrationStatus::Running => "RUNNING",
            MigrationStatus::Succeeded => "SUCCEEDED",
            MigrationStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MigrationStatus::Pending),
            "RUNNING" => Ok(MigrationStatus::Running),
            "SUCCEEDED" => Ok(MigrationStatus::Succeeded),
            "FAILED" => Ok(MigrationStatus::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Sentinel for "never succeeded".
pub const NEVER_SUCCEEDED: i64 = -1;

/// Status, attempt count and last success time shared by jobs and partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub status: MigrationStatus,
    pub attempt_times: u32,
    pub last_succ_timestamp: i64,
}

impl Attempt {
    /// State of a freshly queued unit.
    pub fn fresh() -> Self {
        Self {
            status: MigrationStatus::Pending,
            attempt_times: 0,
            last_succ_timestamp: NEVER_SUCCEEDED,
        }
    }

    /// Records one attempt ending in `requested`.
    ///
    /// `retry_limit` is `Some` for table jobs only: a failure within the limit
    /// is demoted back to `Pending`. Partitions pass `None` and keep exactly
    /// the requested status.
    pub fn record(&self, requested: MigrationStatus, retry_limit: Option<u32>, now_ms: i64) -> Self {
        let attempt_times = self.attempt_times.saturating_add(1);
        let mut status = requested;
        let mut last_succ_timestamp = self.last_succ_timestamp;

        match requested {
            MigrationStatus::Failed => {
                last_succ_timestamp = NEVER_SUCCEEDED;
                if retry_limit.is_some_and(|limit| attempt_times <= limit) {
                    status = MigrationStatus::Pending;
                }
            }
            MigrationStatus::Succeeded => last_succ_timestamp = now_ms,
            MigrationStatus::Pending | MigrationStatus::Running => {}
        }

        Self {
            status,
            attempt_times,
            last_succ_timestamp,
        }
    }
}

/// Partition counts per status for one partitioned job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub num_pending_partitions: u64,
    pub num_running_partitions: u64,
    pub num_succeeded_partitions: u64,
    pub num_failed_partitions: u64,
}

impl MigrationProgress {
    pub fn add(&mut self, status: MigrationStatus, count: u64) {
        match status {
            MigrationStatus::Pending => self.num_pending_partitions += count,
            MigrationStatus::Running => self.num_running_partitions += count,
            MigrationStatus::Succeeded => self.num_succeeded_partitions += count,
            MigrationStatus::Failed => self.num_failed_partitions += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.num_pending_partitions
            + self.num_running_partitions
            + self.num_succeeded_partitions
            + self.num_failed_partitions
    }
}
