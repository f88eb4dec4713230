//! Assembly of ready-to-run table descriptors.
//!
//! Joins pending job rows with live source metadata. Only partition keys and
//! statuses come from the ledger; everything else is fetched from the
//! metadata source on each call.

use rusqlite::Connection;

use super::error::Abort;
use super::status::MigrationStatus;
use crate::db::{job_repo, partition_repo, schema, MigrationJob};
use crate::meta::{MetaSource, TableMetaModel};

pub struct PendingWorkSelector<'a> {
    meta_source: &'a dyn MetaSource,
}

impl<'a> PendingWorkSelector<'a> {
    pub fn new(meta_source: &'a dyn MetaSource) -> Self {
        Self { meta_source }
    }

    /// One descriptor per table-level `PENDING` job, with its `PENDING`
    /// partitions attached and the job's config applied.
    pub(crate) fn select(&self, conn: &Connection) -> Result<Vec<TableMetaModel>, Abort> {
        let jobs = job_repo::list(conn, Some(MigrationStatus::Pending), None)?;
        let mut tables = Vec::with_capacity(jobs.len());
        for job in jobs {
            tables.push(self.describe(conn, &job)?);
        }
        Ok(tables)
    }

    fn describe(&self, conn: &Connection, job: &MigrationJob) -> Result<TableMetaModel, Abort> {
        let mut table = self
            .meta_source
            .get_table_meta_without_partition_meta(&job.db, &job.table)?;

        table.partitions.clear();
        if table.is_partitioned() && schema::has_partition_table(conn, &job.db, &job.table)? {
            let pending = partition_repo::list(
                conn,
                &job.db,
                &job.table,
                Some(MigrationStatus::Pending),
                None,
            )?;
            for partition in pending {
                table.partitions.push(self.meta_source.get_partition_meta(
                    &job.db,
                    &job.table,
                    &partition.partition_values,
                )?);
            }
        }

        job.config.apply(&mut table);
        log::debug!(
            "Pending table {}.{} with {} pending partition(s)",
            job.db,
            job.table,
            table.partitions.len()
        );
        Ok(table)
    }
}
