//! Job repository: merge, select and delete on the table-job collection.
//!
//! Functions take a `&Connection` so callers can compose several of them
//! inside one transaction (a `Transaction` derefs to `Connection`).

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schema::TABLE_META;
use super::StoreError;
use crate::config::TableMigrationConfig;
use crate::ledger::status::{Attempt, MigrationStatus};

/// A table-level migration unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationJob {
    pub db: String,
    pub table: String,
    pub is_partitioned: bool,
    pub config: TableMigrationConfig,
    pub status: MigrationStatus,
    pub attempt_times: u32,
    /// Epoch millis of the last success, `-1` if never.
    pub last_succ_timestamp: i64,
}

impl MigrationJob {
    /// A freshly queued job.
    pub fn pending(db: &str, table: &str, is_partitioned: bool, config: TableMigrationConfig) -> Self {
        let fresh = Attempt::fresh();
        Self {
            db: db.to_string(),
            table: table.to_string(),
            is_partitioned,
            config,
            status: fresh.status,
            attempt_times: fresh.attempt_times,
            last_succ_timestamp: fresh.last_succ_timestamp,
        }
    }

    pub fn attempt(&self) -> Attempt {
        Attempt {
            status: self.status,
            attempt_times: self.attempt_times,
            last_succ_timestamp: self.last_succ_timestamp,
        }
    }

    /// Copy of this job carrying a new attempt record.
    pub fn with_attempt(&self, attempt: Attempt) -> Self {
        Self {
            status: attempt.status,
            attempt_times: attempt.attempt_times,
            last_succ_timestamp: attempt.last_succ_timestamp,
            ..self.clone()
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let config_json: String = row.get("migration_config")?;
        let status: String = row.get("status")?;
        Ok(Self {
            db: row.get("db_name")?,
            table: row.get("table_name")?,
            is_partitioned: row.get("is_partitioned")?,
            config: TableMigrationConfig::from_json(&config_json)?,
            status: status.parse()?,
            attempt_times: row.get("attempt_times")?,
            last_succ_timestamp: row.get("last_succ_timestamp")?,
        })
    }
}

/// Inserts the job or fully overwrites the existing row with the same key.
pub fn upsert(conn: &Connection, job: &MigrationJob) -> Result<(), StoreError> {
    let config_json = job.config.to_json()?;
    conn.execute(
        &format!(
            "INSERT INTO {TABLE_META} (db_name, table_name, is_partitioned, migration_config,
             status, attempt_times, last_succ_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(db_name, table_name) DO UPDATE SET
               is_partitioned = excluded.is_partitioned,
               migration_config = excluded.migration_config,
               status = excluded.status,
               attempt_times = excluded.attempt_times,
               last_succ_timestamp = excluded.last_succ_timestamp"
        ),
        params![
            job.db,
            job.table,
            job.is_partitioned,
            config_json,
            job.status.as_str(),
            job.attempt_times,
            job.last_succ_timestamp,
        ],
    )?;
    Ok(())
}

/// Finds a job by key.
pub fn find(conn: &Connection, db: &str, table: &str) -> Result<Option<MigrationJob>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {TABLE_META} WHERE db_name = ?1 AND table_name = ?2"
    ))?;
    let mut rows = stmt.query(params![db, table])?;
    match rows.next()? {
        Some(row) => Ok(Some(MigrationJob::from_row(row)?)),
        None => Ok(None),
    }
}

/// Whether a job row exists for the key.
pub fn exists(conn: &Connection, db: &str, table: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {TABLE_META} WHERE db_name = ?1 AND table_name = ?2"),
            params![db, table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Lists jobs, optionally filtered by status, ordered by descending table
/// name (then database). `limit` of `None` means unlimited.
pub fn list(
    conn: &Connection,
    status: Option<MigrationStatus>,
    limit: Option<u64>,
) -> Result<Vec<MigrationJob>, StoreError> {
    let mut sql = format!("SELECT * FROM {TABLE_META}");
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = status {
        param_values.push(Box::new(status.as_str()));
        sql.push_str(&format!(" WHERE status = ?{}", param_values.len()));
    }
    sql.push_str(" ORDER BY table_name DESC, db_name DESC");
    if let Some(limit) = limit {
        param_values.push(Box::new(limit as i64));
        sql.push_str(&format!(" LIMIT ?{}", param_values.len()));
    }

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_ref.as_slice())?;

    let mut jobs = Vec::new();
    while let Some(row) = rows.next()? {
        jobs.push(MigrationJob::from_row(row)?);
    }
    Ok(jobs)
}

/// Deletes the job row. Returns whether a row was removed.
pub fn delete(conn: &Connection, db: &str, table: &str) -> Result<bool, StoreError> {
    let removed = conn.execute(
        &format!("DELETE FROM {TABLE_META} WHERE db_name = ?1 AND table_name = ?2"),
        params![db, table],
    )?;
    Ok(removed > 0)
}

/// Rewrites every job in `from` to `to` without counting an attempt.
/// Returns the number of rows changed.
pub fn reset_status(
    conn: &Connection,
    from: MigrationStatus,
    to: MigrationStatus,
) -> Result<usize, StoreError> {
    let changed = conn.execute(
        &format!("UPDATE {TABLE_META} SET status = ?2 WHERE status = ?1"),
        params![from.as_str(), to.as_str()],
    )?;
    Ok(changed)
}
