//! Partition repository: merge, select and aggregate on the per-table
//! partition collections.
//!
//! Every function addresses the collection of one `(db, table)` pair; the
//! collection must exist (see [`schema::ensure_partition_table`]).
//! Partition values are keyed by their JSON array encoding, so two tuples
//! match only if every value matches in order.

use std::collections::HashSet;

use rusqlite::{params, Connection, Row};

use super::schema::{self, partition_table_name};
use super::StoreError;
use crate::ledger::status::{Attempt, MigrationProgress, MigrationStatus};

/// A partition-level migration unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationJobPartition {
    pub partition_values: Vec<String>,
    pub status: MigrationStatus,
    pub attempt_times: u32,
    pub last_succ_timestamp: i64,
}

impl MigrationJobPartition {
    pub fn pending(partition_values: Vec<String>) -> Self {
        Self::from_attempt(partition_values, Attempt::fresh())
    }

    pub fn from_attempt(partition_values: Vec<String>, attempt: Attempt) -> Self {
        Self {
            partition_values,
            status: attempt.status,
            attempt_times: attempt.attempt_times,
            last_succ_timestamp: attempt.last_succ_timestamp,
        }
    }

    pub fn attempt(&self) -> Attempt {
        Attempt {
            status: self.status,
            attempt_times: self.attempt_times,
            last_succ_timestamp: self.last_succ_timestamp,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let values: String = row.get("pt_values")?;
        let status: String = row.get("status")?;
        Ok(Self {
            partition_values: serde_json::from_str(&values)?,
            status: status.parse()?,
            attempt_times: row.get("attempt_times")?,
            last_succ_timestamp: row.get("last_succ_timestamp")?,
        })
    }
}

fn encode_values(values: &[String]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(values)?)
}

/// Inserts or fully overwrites each partition row.
pub fn upsert_all(
    conn: &Connection,
    db: &str,
    table: &str,
    partitions: &[MigrationJobPartition],
) -> Result<(), StoreError> {
    if partitions.is_empty() {
        return Ok(());
    }

    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (pt_values, status, attempt_times, last_succ_timestamp)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(pt_values) DO UPDATE SET
           status = excluded.status,
           attempt_times = excluded.attempt_times,
           last_succ_timestamp = excluded.last_succ_timestamp",
        partition_table_name(db, table)
    ))?;

    for partition in partitions {
        stmt.execute(params![
            encode_values(&partition.partition_values)?,
            partition.status.as_str(),
            partition.attempt_times,
            partition.last_succ_timestamp,
        ])?;
    }
    Ok(())
}

/// Finds one partition by its value tuple.
pub fn find(
    conn: &Connection,
    db: &str,
    table: &str,
    partition_values: &[String],
) -> Result<Option<MigrationJobPartition>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} WHERE pt_values = ?1",
        partition_table_name(db, table)
    ))?;
    let mut rows = stmt.query(params![encode_values(partition_values)?])?;
    match rows.next()? {
        Some(row) => Ok(Some(MigrationJobPartition::from_row(row)?)),
        None => Ok(None),
    }
}

/// Lists partitions, optionally filtered by status, in key order.
/// `limit` of `None` means unlimited.
pub fn list(
    conn: &Connection,
    db: &str,
    table: &str,
    status: Option<MigrationStatus>,
    limit: Option<u64>,
) -> Result<Vec<MigrationJobPartition>, StoreError> {
    let mut sql = format!("SELECT * FROM {}", partition_table_name(db, table));
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = status {
        param_values.push(Box::new(status.as_str()));
        sql.push_str(&format!(" WHERE status = ?{}", param_values.len()));
    }
    sql.push_str(" ORDER BY pt_values");
    if let Some(limit) = limit {
        param_values.push(Box::new(limit as i64));
        sql.push_str(&format!(" LIMIT ?{}", param_values.len()));
    }

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_ref.as_slice())?;

    let mut partitions = Vec::new();
    while let Some(row) = rows.next()? {
        partitions.push(MigrationJobPartition::from_row(row)?);
    }
    Ok(partitions)
}

/// Returns the tuples from `candidates` that have no row yet, preserving
/// their order and dropping duplicates within `candidates`.
pub fn filter_out_existing(
    conn: &Connection,
    db: &str,
    table: &str,
    candidates: Vec<Vec<String>>,
) -> Result<Vec<Vec<String>>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT pt_values FROM {}",
        partition_table_name(db, table)
    ))?;
    let mut seen: HashSet<String> = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;

    let mut fresh = Vec::new();
    for values in candidates {
        if seen.insert(encode_values(&values)?) {
            fresh.push(values);
        }
    }
    Ok(fresh)
}

/// Groups the table's partition rows by status.
pub fn progress(conn: &Connection, db: &str, table: &str) -> Result<MigrationProgress, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT status, COUNT(1) FROM {} GROUP BY status",
        partition_table_name(db, table)
    ))?;
    let mut rows = stmt.query([])?;

    let mut progress = MigrationProgress::default();
    while let Some(row) = rows.next()? {
        let status: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        progress.add(status.parse()?, count as u64);
    }
    Ok(progress)
}

/// Rewrites every partition in `from` to `to` without counting an attempt.
/// Returns the number of rows changed.
pub fn reset_status(
    conn: &Connection,
    db: &str,
    table: &str,
    from: MigrationStatus,
    to: MigrationStatus,
) -> Result<usize, StoreError> {
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET status = ?2 WHERE status = ?1",
            partition_table_name(db, table)
        ),
        params![from.as_str(), to.as_str()],
    )?;
    Ok(changed)
}

/// Drops the whole partition collection of `(db, table)`.
pub fn drop_all(conn: &Connection, db: &str, table: &str) -> Result<(), StoreError> {
    schema::drop_partition_table(conn, db, table)
}
