//! Ledger error types.
//!
//! Callers get one typed error per operation. Store and metadata-source
//! failures inside a transactional sequence are wrapped in the `Failed*`
//! variant for that operation, after the sequence has been rolled back.

use thiserror::Error;

use crate::db::StoreError;
use crate::meta::MetaSourceError;

/// Boxed underlying cause of a wrapped failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`MigrationLedger`](super::MigrationLedger).
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Migration job not existed, db: {db}, tbl: {table}")]
    JobNotFound { db: String, table: String },

    #[error("Migration job partition not existed, db: {db}, tbl: {table}, partition: {values:?}")]
    PartitionNotFound {
        db: String,
        table: String,
        values: Vec<String>,
    },

    #[error("Running migration job exists, db: {db}, tbl: {table}")]
    JobAlreadyExists { db: String, table: String },

    #[error("Failed to acquire a store session: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Failed to add migration job, db: {db}, tbl: {table}: {source}")]
    FailedToAddJob {
        db: String,
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to remove migration job, db: {db}, tbl: {table}: {source}")]
    FailedToRemoveJob {
        db: String,
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to update migration job, db: {db}, tbl: {table}: {source}")]
    FailedToUpdateJob {
        db: String,
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to list migration jobs: {source}")]
    FailedToListJobs {
        #[source]
        source: BoxError,
    },

    #[error("Failed to get migration job, db: {db}, tbl: {table}: {source}")]
    FailedToGetJob {
        db: String,
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to get pending jobs: {source}")]
    FailedToGetPendingJobs {
        #[source]
        source: BoxError,
    },

    #[error("Recovery failed: {source}")]
    RecoveryFailed {
        #[source]
        source: BoxError,
    },
}

/// Fieldless discriminant of [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    JobNotFound,
    PartitionNotFound,
    JobAlreadyExists,
    StoreUnavailable,
    FailedToAddJob,
    FailedToRemoveJob,
    FailedToUpdateJob,
    FailedToListJobs,
    FailedToGetJob,
    FailedToGetPendingJobs,
    RecoveryFailed,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LedgerError::JobNotFound { .. } => ErrorKind::JobNotFound,
            LedgerError::PartitionNotFound { .. } => ErrorKind::PartitionNotFound,
            LedgerError::JobAlreadyExists { .. } => ErrorKind::JobAlreadyExists,
            LedgerError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            LedgerError::FailedToAddJob { .. } => ErrorKind::FailedToAddJob,
            LedgerError::FailedToRemoveJob { .. } => ErrorKind::FailedToRemoveJob,
            LedgerError::FailedToUpdateJob { .. } => ErrorKind::FailedToUpdateJob,
            LedgerError::FailedToListJobs { .. } => ErrorKind::FailedToListJobs,
            LedgerError::FailedToGetJob { .. } => ErrorKind::FailedToGetJob,
            LedgerError::FailedToGetPendingJobs { .. } => ErrorKind::FailedToGetPendingJobs,
            LedgerError::RecoveryFailed { .. } => ErrorKind::RecoveryFailed,
        }
    }

    /// "Nothing to do" for the scheduler.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::JobNotFound | ErrorKind::PartitionNotFound
        )
    }

    /// Failures the scheduler may retry at its own discretion.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreUnavailable
                | ErrorKind::FailedToAddJob
                | ErrorKind::FailedToRemoveJob
                | ErrorKind::FailedToUpdateJob
                | ErrorKind::FailedToListJobs
                | ErrorKind::FailedToGetJob
                | ErrorKind::FailedToGetPendingJobs
        )
    }

    pub(crate) fn job_not_found(db: &str, table: &str) -> Self {
        LedgerError::JobNotFound {
            db: db.to_string(),
            table: table.to_string(),
        }
    }

    pub(crate) fn partition_not_found(db: &str, table: &str, values: &[String]) -> Self {
        LedgerError::PartitionNotFound {
            db: db.to_string(),
            table: table.to_string(),
            values: values.to_vec(),
        }
    }

    pub(crate) fn job_already_exists(db: &str, table: &str) -> Self {
        LedgerError::JobAlreadyExists {
            db: db.to_string(),
            table: table.to_string(),
        }
    }
}

/// Why a ledger sequence stopped: a caller-facing outcome that passes
/// through unchanged, or an underlying failure that gets wrapped.
#[derive(Debug)]
pub(crate) enum Abort {
    Ledger(LedgerError),
    Cause(BoxError),
}

impl Abort {
    /// Resolves into the caller-facing error, wrapping causes with `wrap`.
    pub(crate) fn into_ledger_error(self, wrap: impl FnOnce(BoxError) -> LedgerError) -> LedgerError {
        match self {
            Abort::Ledger(e) => e,
            Abort::Cause(cause) => wrap(cause),
        }
    }
}

impl From<LedgerError> for Abort {
    fn from(e: LedgerError) -> Self {
        Abort::Ledger(e)
    }
}

impl From<StoreError> for Abort {
    fn from(e: StoreError) -> Self {
        Abort::Cause(Box::new(e))
    }
}

impl From<MetaSourceError> for Abort {
    fn from(e: MetaSourceError) -> Self {
        Abort::Cause(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_policy() {
        let e = LedgerError::job_not_found("test", "t");
        assert_eq!(e.kind(), ErrorKind::JobNotFound);
        assert!(e.is_not_found());
        assert!(!e.is_retryable());

        let e = LedgerError::FailedToUpdateJob {
            db: "test".into(),
            table: "t".into(),
            source: Box::new(StoreError::LockPoisoned),
        };
        assert!(e.is_retryable());
        assert!(!e.is_not_found());
    }

    #[test]
    fn test_wrapped_error_keeps_source() {
        let e = LedgerError::FailedToAddJob {
            db: "test".into(),
            table: "t".into(),
            source: Box::new(MetaSourceError::Backend("hms down".into())),
        };
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("hms down"));
        assert!(e.to_string().contains("Failed to add migration job"));
    }

    #[test]
    fn test_abort_passes_ledger_errors_through() {
        let abort = Abort::from(LedgerError::job_already_exists("test", "t"));
        let e = abort.into_ledger_error(|source| LedgerError::FailedToAddJob {
            db: "test".into(),
            table: "t".into(),
            source,
        });
        assert_eq!(e.kind(), ErrorKind::JobAlreadyExists);
    }

    #[test]
    fn test_abort_wraps_causes() {
        let abort = Abort::from(StoreError::LockPoisoned);
        let e = abort.into_ledger_error(|source| LedgerError::FailedToListJobs { source });
        assert_eq!(e.kind(), ErrorKind::FailedToListJobs);
    }
}
