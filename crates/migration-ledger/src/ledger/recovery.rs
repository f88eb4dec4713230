//! Startup reconciliation.
//!
//! `RUNNING` is never a valid at-rest status across restarts: a unit left in
//! it was dispatched by a process that died before recording the outcome.
//! Every such job and partition goes back to `PENDING` in one transaction,
//! without counting an attempt.

use rusqlite::Connection;

use super::error::LedgerError;
use super::status::MigrationStatus;
use crate::db::{self, job_repo, partition_repo, schema, Store, StoreError};

/// What recovery rewrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub jobs_reset: usize,
    pub partitions_reset: usize,
}

/// Resets every `RUNNING` job and partition to `PENDING` and commits.
pub fn recover(store: &Store) -> Result<RecoveryReport, LedgerError> {
    let mut session = store
        .session()
        .map_err(|e| LedgerError::RecoveryFailed { source: Box::new(e) })?;

    let report = db::in_transaction(&mut session, reset_running)
        .map_err(|e| LedgerError::RecoveryFailed { source: Box::new(e) })?;

    if report.jobs_reset > 0 || report.partitions_reset > 0 {
        log::warn!(
            "Recovered {} running job(s) and {} running partition(s) back to pending",
            report.jobs_reset,
            report.partitions_reset
        );
    } else {
        log::info!("Recovery found nothing to reset");
    }

    Ok(report)
}

fn reset_running(conn: &Connection) -> Result<RecoveryReport, StoreError> {
    let jobs_reset =
        job_repo::reset_status(conn, MigrationStatus::Running, MigrationStatus::Pending)?;

    let mut partitions_reset = 0;
    for (db, table) in schema::list_partition_tables(conn)? {
        let reset = partition_repo::reset_status(
            conn,
            &db,
            &table,
            MigrationStatus::Running,
            MigrationStatus::Pending,
        )?;
        if reset > 0 {
            log::debug!("Reset {} running partition(s) of {}.{}", reset, db, table);
        }
        partitions_reset += reset;
    }

    Ok(RecoveryReport {
        jobs_reset,
        partitions_reset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableMigrationConfig;
    use crate::db::{MigrationJob, MigrationJobPartition};

    fn seed(store: &Store) {
        store
            .with_transaction(|conn| {
                let mut running = MigrationJob::pending(
                    "test",
                    "p",
                    true,
                    TableMigrationConfig::new("test", "p", "test", "p"),
                );
                running.status = MigrationStatus::Running;
                running.attempt_times = 1;
                job_repo::upsert(conn, &running)?;

                let mut done = MigrationJob::pending(
                    "test",
                    "d",
                    false,
                    TableMigrationConfig::new("test", "d", "test", "d"),
                );
                done.status = MigrationStatus::Succeeded;
                job_repo::upsert(conn, &done)?;

                schema::ensure_partition_namespace(conn, "test")?;
                schema::ensure_partition_table(conn, "test", "p")?;
                let mut pt_running = MigrationJobPartition::pending(vec!["a".into()]);
                pt_running.status = MigrationStatus::Running;
                let mut pt_failed = MigrationJobPartition::pending(vec!["b".into()]);
                pt_failed.status = MigrationStatus::Failed;
                partition_repo::upsert_all(conn, "test", "p", &[pt_running, pt_failed])?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_recover_resets_running_units() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let report = recover(&store).unwrap();
        assert_eq!(
            report,
            RecoveryReport {
                jobs_reset: 1,
                partitions_reset: 1
            }
        );

        store
            .with_session(|conn| {
                let job = job_repo::find(conn, "test", "p")?.unwrap();
                assert_eq!(job.status, MigrationStatus::Pending);
                assert_eq!(job.attempt_times, 1);

                let done = job_repo::find(conn, "test", "d")?.unwrap();
                assert_eq!(done.status, MigrationStatus::Succeeded);

                let a = partition_repo::find(conn, "test", "p", &["a".to_string()])?.unwrap();
                assert_eq!(a.status, MigrationStatus::Pending);
                let b = partition_repo::find(conn, "test", "p", &["b".to_string()])?.unwrap();
                assert_eq!(b.status, MigrationStatus::Failed);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_recover_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);
        recover(&store).unwrap();
        assert_eq!(recover(&store).unwrap(), RecoveryReport::default());
    }
}
