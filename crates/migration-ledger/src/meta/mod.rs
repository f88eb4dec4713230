//! Source metadata: the models returned by a [`MetaSource`] and the trait
//! itself.
//!
//! The ledger never caches anything here beyond partition keys; every
//! schema or partition fact is read live from the source.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a metadata source.
#[derive(Error, Debug)]
pub enum MetaSourceError {
    #[error("Database '{0}' does not exist")]
    DatabaseNotFound(String),

    #[error("Table '{db}.{table}' does not exist")]
    TableNotFound { db: String, table: String },

    #[error("Partition {values:?} of '{db}.{table}' does not exist")]
    PartitionNotFound {
        db: String,
        table: String,
        values: Vec<String>,
    },

    /// Any failure inside the source system client.
    #[error("Metadata source error: {0}")]
    Backend(String),
}

/// One column, with its source and destination names and types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetaModel {
    pub column_name: String,
    pub odps_column_name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub odps_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnMetaModel {
    pub fn new(name: &str, column_type: &str) -> Self {
        Self {
            column_name: name.to_string(),
            odps_column_name: name.to_string(),
            column_type: column_type.to_string(),
            odps_type: column_type.to_string(),
            comment: None,
        }
    }
}

/// One partition instance of a partitioned table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionMetaModel {
    /// Values in partition-column order.
    pub partition_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<i64>,
}

impl PartitionMetaModel {
    pub fn new(partition_values: Vec<String>) -> Self {
        Self {
            partition_values,
            ..Default::default()
        }
    }
}

/// A table descriptor as handed to the execution layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetaModel {
    pub database_name: String,
    pub odps_project_name: String,
    pub table_name: String,
    pub odps_table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnMetaModel>,
    #[serde(default)]
    pub partition_columns: Vec<ColumnMetaModel>,
    #[serde(default)]
    pub partitions: Vec<PartitionMetaModel>,
}

impl TableMetaModel {
    pub fn new(database_name: &str, table_name: &str) -> Self {
        Self {
            database_name: database_name.to_string(),
            odps_project_name: database_name.to_string(),
            table_name: table_name.to_string(),
            odps_table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partition_columns.is_empty()
    }
}

/// Live facts about the source warehouse.
///
/// Implementations are shared across scheduler threads, hence `Send + Sync`.
pub trait MetaSource: Send + Sync {
    /// Full table metadata including every partition instance.
    fn get_table_meta(&self, db: &str, table: &str) -> Result<TableMetaModel, MetaSourceError>;

    /// Table schema with `partitions` left empty.
    fn get_table_meta_without_partition_meta(
        &self,
        db: &str,
        table: &str,
    ) -> Result<TableMetaModel, MetaSourceError>;

    fn get_partition_meta(
        &self,
        db: &str,
        table: &str,
        partition_values: &[String],
    ) -> Result<PartitionMetaModel, MetaSourceError>;

    /// Every partition of the table as value tuples.
    fn list_partitions(&self, db: &str, table: &str) -> Result<Vec<Vec<String>>, MetaSourceError>;

    fn has_table(&self, db: &str, table: &str) -> Result<bool, MetaSourceError>;

    fn has_database(&self, db: &str) -> Result<bool, MetaSourceError>;

    fn list_tables(&self, db: &str) -> Result<Vec<String>, MetaSourceError>;

    fn list_databases(&self) -> Result<Vec<String>, MetaSourceError>;

    /// Releases source-system resources. Called once at teardown.
    fn shutdown(&self) {}
}
