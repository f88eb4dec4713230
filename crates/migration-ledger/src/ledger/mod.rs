//! The migration ledger.
//!
//! Tracks table-level jobs and their partition units through
//! `PENDING -> RUNNING -> SUCCEEDED | FAILED`, with automatic retry demotion
//! for table jobs. Every public operation runs under one process-wide lock,
//! and every multi-row write commits as a single transaction.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::{LedgerConfig, TableMigrationConfig};
use crate::db::{
    self, job_repo, partition_repo, schema, MigrationJob, MigrationJobPartition, PooledSession,
    Store, StoreError,
};
use crate::meta::{MetaSource, TableMetaModel};

pub mod error;
pub mod pending;
pub mod recovery;
pub mod status;

pub use error::{ErrorKind, LedgerError};
pub use pending::PendingWorkSelector;
pub use recovery::RecoveryReport;
pub use status::{Attempt, MigrationProgress, MigrationStatus, NEVER_SUCCEEDED};

use error::Abort;

/// Persistent state machine for migration jobs and partitions.
pub struct MigrationLedger {
    store: Store,
    meta_source: Arc<dyn MetaSource>,
    lock: Mutex<()>,
    recovery: RecoveryReport,
}

impl MigrationLedger {
    /// Opens the on-disk ledger and reconciles it before returning.
    pub fn open(config: &LedgerConfig, meta_source: Arc<dyn MetaSource>) -> Result<Self, LedgerError> {
        let store = Store::open(config).map_err(LedgerError::StoreUnavailable)?;
        Self::with_store(store, meta_source)
    }

    /// Ledger over a private in-memory store.
    pub fn in_memory(meta_source: Arc<dyn MetaSource>) -> Result<Self, LedgerError> {
        let store = Store::open_in_memory().map_err(LedgerError::StoreUnavailable)?;
        Self::with_store(store, meta_source)
    }

    /// Wraps an opened store. Recovery runs and commits first.
    pub fn with_store(store: Store, meta_source: Arc<dyn MetaSource>) -> Result<Self, LedgerError> {
        let recovery = recovery::recover(&store)?;
        Ok(Self {
            store,
            meta_source,
            lock: Mutex::new(()),
            recovery,
        })
    }

    /// What startup recovery reset.
    pub fn recovery_report(&self) -> RecoveryReport {
        self.recovery
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Queues a table (and its partitions) for migration.
    ///
    /// Re-adding a job that is not `PENDING` requeues the table and extends
    /// its partition set; partitions already tracked keep their state.
    pub fn add_migration_job(&self, config: &TableMigrationConfig) -> Result<(), LedgerError> {
        let (db, table) = normalize_key(&config.source_database_name, &config.source_table_name)?;
        log::info!("Adding migration job, db: {}, tbl: {}", db, table);

        let _guard = self.lock()?;
        let mut session = self.session()?;

        let added = db::in_transaction(&mut session, |conn| -> Result<usize, Abort> {
            let existing = job_repo::find(conn, &db, &table)?;
            if existing
                .as_ref()
                .is_some_and(|job| job.status == MigrationStatus::Pending)
            {
                return Err(LedgerError::job_already_exists(&db, &table).into());
            }

            let source = self
                .meta_source
                .get_table_meta_without_partition_meta(&db, &table)?;
            let is_partitioned = match &existing {
                Some(job) if job.is_partitioned != source.is_partitioned() => {
                    log::warn!(
                        "Partitioning of {}.{} changed at the source, keeping the tracked layout",
                        db,
                        table
                    );
                    job.is_partitioned
                }
                _ => source.is_partitioned(),
            };

            job_repo::upsert(
                conn,
                &MigrationJob::pending(&db, &table, is_partitioned, config.clone()),
            )?;

            if !is_partitioned {
                return Ok(0);
            }

            schema::ensure_partition_namespace(conn, &db)?;
            schema::ensure_partition_table(conn, &db, &table)?;
            let candidates = match &config.partition_values_list {
                Some(list) => list.clone(),
                None => self.meta_source.list_partitions(&db, &table)?,
            };
            let fresh: Vec<MigrationJobPartition> =
                partition_repo::filter_out_existing(conn, &db, &table, candidates)?
                    .into_iter()
                    .map(MigrationJobPartition::pending)
                    .collect();
            partition_repo::upsert_all(conn, &db, &table, &fresh)?;
            Ok(fresh.len())
        })
        .map_err(|abort| {
            log_failure(abort.into_ledger_error(|source| LedgerError::FailedToAddJob {
                db: db.clone(),
                table: table.clone(),
                source,
            }))
        })?;

        log::info!(
            "Added migration job, db: {}, tbl: {}, new partitions: {}",
            db,
            table,
            added
        );
        Ok(())
    }

    /// Deletes the job and its partition collection. Absent jobs are a no-op.
    pub fn remove_migration_job(&self, db: &str, table: &str) -> Result<(), LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        log::info!("Removing migration job, db: {}, tbl: {}", db, table);

        let _guard = self.lock()?;
        let mut session = self.session()?;

        db::in_transaction(&mut session, |conn| -> Result<(), Abort> {
            let Some(job) = job_repo::find(conn, &db, &table)? else {
                return Ok(());
            };
            if job.status == MigrationStatus::Pending {
                return Err(LedgerError::job_already_exists(&db, &table).into());
            }
            if job.is_partitioned {
                partition_repo::drop_all(conn, &db, &table)?;
            }
            job_repo::delete(conn, &db, &table)?;
            Ok(())
        })
        .map_err(|abort| {
            log_failure(abort.into_ledger_error(|source| LedgerError::FailedToRemoveJob {
                db: db.clone(),
                table: table.clone(),
                source,
            }))
        })
    }

    pub fn has_migration_job(&self, db: &str, table: &str) -> Result<bool, LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        let _guard = self.lock()?;
        let session = self.session()?;

        job_repo::exists(&session, &db, &table).map_err(|e| LedgerError::FailedToGetJob {
            db: db.clone(),
            table: table.clone(),
            source: Box::new(e),
        })
    }

    /// Configs of matching jobs, by descending table name. `limit` of `None`
    /// means unlimited.
    pub fn list_migration_jobs(
        &self,
        status: Option<MigrationStatus>,
        limit: Option<u64>,
    ) -> Result<Vec<TableMigrationConfig>, LedgerError> {
        let _guard = self.lock()?;
        let session = self.session()?;

        let jobs = job_repo::list(&session, status, limit)
            .map_err(|e| log_failure(LedgerError::FailedToListJobs { source: Box::new(e) }))?;
        Ok(jobs.into_iter().map(|job| job.config).collect())
    }

    /// Full job row.
    pub fn get_job(&self, db: &str, table: &str) -> Result<MigrationJob, LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        let _guard = self.lock()?;
        let session = self.session()?;
        self.read(&session, &db, &table, |conn| find_job(conn, &db, &table))
    }

    pub fn get_status(&self, db: &str, table: &str) -> Result<MigrationStatus, LedgerError> {
        Ok(self.get_job(db, table)?.status)
    }

    pub fn get_partition_status(
        &self,
        db: &str,
        table: &str,
        partition_values: &[String],
    ) -> Result<MigrationStatus, LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        let _guard = self.lock()?;
        let session = self.session()?;

        self.read(&session, &db, &table, |conn| {
            Ok(find_partition(conn, &db, &table, partition_values)?.status)
        })
    }

    pub fn get_config(&self, db: &str, table: &str) -> Result<TableMigrationConfig, LedgerError> {
        Ok(self.get_job(db, table)?.config)
    }

    /// Records one table-level attempt ending in `status`.
    ///
    /// A `FAILED` outcome within the job's retry limit is persisted as
    /// `PENDING` so the scheduler picks the table up again.
    pub fn update_status(
        &self,
        db: &str,
        table: &str,
        status: MigrationStatus,
    ) -> Result<(), LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        log::info!(
            "Updating migration job status, db: {}, tbl: {}, status: {}",
            db,
            table,
            status
        );

        let _guard = self.lock()?;
        let mut session = self.session()?;

        let next = db::in_transaction(&mut session, |conn| -> Result<Attempt, Abort> {
            let job = find_job(conn, &db, &table)?;
            let next = job.attempt().record(
                status,
                Some(job.config.retry_times_limit()),
                now_millis(),
            );
            job_repo::upsert(conn, &job.with_attempt(next))?;
            Ok(next)
        })
        .map_err(|abort| {
            log_failure(abort.into_ledger_error(|source| LedgerError::FailedToUpdateJob {
                db: db.clone(),
                table: table.clone(),
                source,
            }))
        })?;

        if next.status != status {
            log::info!(
                "Migration job {}.{} failed on attempt {}, queued for retry",
                db,
                table,
                next.attempt_times
            );
        }
        Ok(())
    }

    /// Records one attempt ending in `status` for each listed partition.
    ///
    /// Partitions keep exactly the requested status; retry policy lives at
    /// the table level. Every partition must exist or nothing is written.
    pub fn update_partition_status(
        &self,
        db: &str,
        table: &str,
        partition_values_list: &[Vec<String>],
        status: MigrationStatus,
    ) -> Result<(), LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        log::info!(
            "Updating {} partition(s) of {}.{} to {}",
            partition_values_list.len(),
            db,
            table,
            status
        );

        let _guard = self.lock()?;
        let mut session = self.session()?;

        db::in_transaction(&mut session, |conn| -> Result<(), Abort> {
            let now = now_millis();
            let mut updated = Vec::with_capacity(partition_values_list.len());
            for values in partition_values_list {
                let partition = find_partition(conn, &db, &table, values)?;
                updated.push(MigrationJobPartition::from_attempt(
                    partition.partition_values.clone(),
                    partition.attempt().record(status, None, now),
                ));
            }
            partition_repo::upsert_all(conn, &db, &table, &updated)?;
            Ok(())
        })
        .map_err(|abort| {
            log_failure(abort.into_ledger_error(|source| LedgerError::FailedToUpdateJob {
                db: db.clone(),
                table: table.clone(),
                source,
            }))
        })
    }

    /// Partition counts per status, `None` for a non-partitioned job.
    ///
    /// Progress is advisory: store failures are logged and reported as
    /// `None`. Only an absent job or a bad key is an error.
    pub fn get_progress(
        &self,
        db: &str,
        table: &str,
    ) -> Result<Option<MigrationProgress>, LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        let _guard = self.lock()?;

        let session = match self.store.session() {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Progress of {}.{} unavailable: {}", db, table, e);
                return Ok(None);
            }
        };

        let result = (|| -> Result<Option<MigrationProgress>, Abort> {
            let job = find_job(&session, &db, &table)?;
            if !job.is_partitioned || !schema::has_partition_table(&session, &db, &table)? {
                return Ok(None);
            }
            Ok(Some(partition_repo::progress(&session, &db, &table)?))
        })();

        match result {
            Ok(progress) => Ok(progress),
            Err(Abort::Ledger(e)) => Err(e),
            Err(Abort::Cause(cause)) => {
                log::warn!("Progress of {}.{} unavailable: {}", db, table, cause);
                Ok(None)
            }
        }
    }

    /// Partition rows of a job, optionally filtered by status. Empty for a
    /// non-partitioned job.
    pub fn list_partitions(
        &self,
        db: &str,
        table: &str,
        status: Option<MigrationStatus>,
        limit: Option<u64>,
    ) -> Result<Vec<MigrationJobPartition>, LedgerError> {
        let (db, table) = normalize_key(db, table)?;
        let _guard = self.lock()?;
        let session = self.session()?;

        self.read(&session, &db, &table, |conn| {
            let job = find_job(conn, &db, &table)?;
            if !job.is_partitioned || !schema::has_partition_table(conn, &db, &table)? {
                return Ok(Vec::new());
            }
            Ok(partition_repo::list(conn, &db, &table, status, limit)?)
        })
    }

    /// Ready-to-run descriptors for every `PENDING` job.
    pub fn get_pending_tables(&self) -> Result<Vec<TableMetaModel>, LedgerError> {
        let _guard = self.lock()?;
        let session = self.session()?;

        let tables = PendingWorkSelector::new(self.meta_source.as_ref())
            .select(&session)
            .map_err(|abort| {
                log_failure(
                    abort.into_ledger_error(|source| LedgerError::FailedToGetPendingJobs { source }),
                )
            })?;
        log::info!("Found {} pending table(s)", tables.len());
        Ok(tables)
    }

    /// Releases the metadata source and the session pool.
    pub fn shutdown(&self) {
        match self.lock.lock() {
            Ok(_guard) => self.close(),
            Err(poisoned) => {
                let _guard = poisoned.into_inner();
                self.close();
            }
        }
    }

    fn close(&self) {
        self.meta_source.shutdown();
        self.store.close();
        log::info!("Migration ledger shut down");
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, LedgerError> {
        self.lock
            .lock()
            .map_err(|_| LedgerError::StoreUnavailable(StoreError::LockPoisoned))
    }

    fn session(&self) -> Result<PooledSession<'_>, LedgerError> {
        self.store.session().map_err(|e| {
            log::error!("Failed to acquire a store session: {}", e);
            LedgerError::StoreUnavailable(e)
        })
    }

    /// Runs a read on `conn`, wrapping store failures as `FailedToGetJob`.
    fn read<T>(
        &self,
        conn: &Connection,
        db: &str,
        table: &str,
        f: impl FnOnce(&Connection) -> Result<T, Abort>,
    ) -> Result<T, LedgerError> {
        f(conn).map_err(|abort| {
            abort.into_ledger_error(|source| LedgerError::FailedToGetJob {
                db: db.to_string(),
                table: table.to_string(),
                source,
            })
        })
    }
}

fn find_job(conn: &Connection, db: &str, table: &str) -> Result<MigrationJob, Abort> {
    job_repo::find(conn, db, table)?
        .ok_or_else(|| LedgerError::job_not_found(db, table).into())
}

fn find_partition(
    conn: &Connection,
    db: &str,
    table: &str,
    partition_values: &[String],
) -> Result<MigrationJobPartition, Abort> {
    if !schema::has_partition_table(conn, db, table)? {
        return Err(LedgerError::partition_not_found(db, table, partition_values).into());
    }
    partition_repo::find(conn, db, table, partition_values)?
        .ok_or_else(|| LedgerError::partition_not_found(db, table, partition_values).into())
}

/// Validates and case-folds a job key.
fn normalize_key(db: &str, table: &str) -> Result<(String, String), LedgerError> {
    if db.trim().is_empty() {
        return Err(LedgerError::InvalidArgument(
            "database name is empty".to_string(),
        ));
    }
    if table.trim().is_empty() {
        return Err(LedgerError::InvalidArgument("table name is empty".to_string()));
    }
    Ok((db.to_lowercase(), table.to_lowercase()))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn log_failure(e: LedgerError) -> LedgerError {
    if e.is_retryable() {
        log::error!("{}", e);
    }
    e
}
