//! In-process metadata source.
//!
//! Database `test` holds `test_non_partitioned` (column `foo string`) and
//! `test_partitioned` (column `foo string`, partition column `bar string`,
//! one partition `["hello_world"]`).

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use migration_ledger::meta::{
    ColumnMetaModel, MetaSource, MetaSourceError, PartitionMetaModel, TableMetaModel,
};

pub const DB: &str = "test";
pub const NON_PARTITIONED: &str = "test_non_partitioned";
pub const PARTITIONED: &str = "test_partitioned";
pub const PARTITION_VALUE: &str = "hello_world";

pub struct MockMetaSource {
    partitions: Mutex<Vec<Vec<String>>>,
    fail_partition_listing: AtomicBool,
    shutdowns: AtomicUsize,
}

impl MockMetaSource {
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(vec![vec![PARTITION_VALUE.to_string()]]),
            fail_partition_listing: AtomicBool::new(false),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Replaces the partitions of `test_partitioned`.
    pub fn set_partitions(&self, partitions: Vec<Vec<String>>) {
        *self.partitions.lock().unwrap() = partitions;
    }

    /// Makes `list_partitions` fail, as a flaky metastore would.
    pub fn fail_partition_listing(&self, fail: bool) {
        self.fail_partition_listing.store(fail, Ordering::SeqCst);
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn check_table(db: &str, table: &str) -> Result<(), MetaSourceError> {
        if db != DB {
            return Err(MetaSourceError::DatabaseNotFound(db.to_string()));
        }
        if table != NON_PARTITIONED && table != PARTITIONED {
            return Err(MetaSourceError::TableNotFound {
                db: db.to_string(),
                table: table.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MockMetaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaSource for MockMetaSource {
    fn get_table_meta(&self, db: &str, table: &str) -> Result<TableMetaModel, MetaSourceError> {
        let mut meta = self.get_table_meta_without_partition_meta(db, table)?;
        if meta.is_partitioned() {
            meta.partitions = self
                .list_partitions(db, table)?
                .into_iter()
                .map(PartitionMetaModel::new)
                .collect();
        }
        Ok(meta)
    }

    fn get_table_meta_without_partition_meta(
        &self,
        db: &str,
        table: &str,
    ) -> Result<TableMetaModel, MetaSourceError> {
        Self::check_table(db, table)?;
        let mut meta = TableMetaModel::new(db, table);
        meta.columns.push(ColumnMetaModel::new("foo", "string"));
        if table == PARTITIONED {
            meta.partition_columns
                .push(ColumnMetaModel::new("bar", "string"));
        }
        Ok(meta)
    }

    fn get_partition_meta(
        &self,
        db: &str,
        table: &str,
        partition_values: &[String],
    ) -> Result<PartitionMetaModel, MetaSourceError> {
        Self::check_table(db, table)?;
        let known = self.partitions.lock().unwrap();
        if table != PARTITIONED || !known.iter().any(|p| p.as_slice() == partition_values) {
            return Err(MetaSourceError::PartitionNotFound {
                db: db.to_string(),
                table: table.to_string(),
                values: partition_values.to_vec(),
            });
        }
        Ok(PartitionMetaModel::new(partition_values.to_vec()))
    }

    fn list_partitions(&self, db: &str, table: &str) -> Result<Vec<Vec<String>>, MetaSourceError> {
        Self::check_table(db, table)?;
        if self.fail_partition_listing.load(Ordering::SeqCst) {
            return Err(MetaSourceError::Backend("metastore connection reset".to_string()));
        }
        if table != PARTITIONED {
            return Ok(Vec::new());
        }
        Ok(self.partitions.lock().unwrap().clone())
    }

    fn has_table(&self, db: &str, table: &str) -> Result<bool, MetaSourceError> {
        Ok(Self::check_table(db, table).is_ok())
    }

    fn has_database(&self, db: &str) -> Result<bool, MetaSourceError> {
        Ok(db == DB)
    }

    fn list_tables(&self, db: &str) -> Result<Vec<String>, MetaSourceError> {
        if db != DB {
            return Err(MetaSourceError::DatabaseNotFound(db.to_string()));
        }
        Ok(vec![NON_PARTITIONED.to_string(), PARTITIONED.to_string()])
    }

    fn list_databases(&self) -> Result<Vec<String>, MetaSourceError> {
        Ok(vec![DB.to_string()])
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
