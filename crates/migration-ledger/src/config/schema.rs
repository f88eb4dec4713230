use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::meta::TableMetaModel;

/// Per-table migration settings. Persisted as an opaque JSON blob on the job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMigrationConfig {
    pub source_database_name: String,
    pub source_table_name: String,
    pub dest_project_name: String,
    pub dest_table_name: String,
    /// Explicit partitions to migrate. `None` means every partition at the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_values_list: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub additional_table_config: AdditionalTableConfig,
}

impl TableMigrationConfig {
    pub fn new(source_db: &str, source_table: &str, dest_project: &str, dest_table: &str) -> Self {
        Self {
            source_database_name: source_db.to_string(),
            source_table_name: source_table.to_string(),
            dest_project_name: dest_project.to_string(),
            dest_table_name: dest_table.to_string(),
            partition_values_list: None,
            additional_table_config: AdditionalTableConfig::default(),
        }
    }

    pub fn with_partitions(mut self, partition_values_list: Vec<Vec<String>>) -> Self {
        self.partition_values_list = Some(partition_values_list);
        self
    }

    pub fn with_additional(mut self, additional: AdditionalTableConfig) -> Self {
        self.additional_table_config = additional;
        self
    }

    pub fn retry_times_limit(&self) -> u32 {
        self.additional_table_config.retry_times_limit
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Rewrites destination naming on a source descriptor in place.
    pub fn apply(&self, table: &mut TableMetaModel) {
        table.odps_project_name = self.dest_project_name.to_lowercase();
        table.odps_table_name = self.dest_table_name.to_lowercase();
        for column in table
            .columns
            .iter_mut()
            .chain(table.partition_columns.iter_mut())
        {
            column.odps_column_name = column.column_name.to_lowercase();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalTableConfig {
    #[serde(default = "default_partition_group_size")]
    pub partition_group_size: u32,
    /// Failed table-level attempts allowed before FAILED becomes terminal.
    #[serde(default = "default_retry_times_limit")]
    pub retry_times_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_lifecycle: Option<u32>,
    /// Extra settings passed with every statement for this table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
}

fn default_partition_group_size() -> u32 {
    50
}

fn default_retry_times_limit() -> u32 {
    1
}

impl Default for AdditionalTableConfig {
    fn default() -> Self {
        Self {
            partition_group_size: default_partition_group_size(),
            retry_times_limit: default_retry_times_limit(),
            table_lifecycle: None,
            settings: BTreeMap::new(),
        }
    }
}

/// Store location and session pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Store root. Falls back to the `MMA_HOME` environment variable.
    #[serde(default)]
    pub home: Option<PathBuf>,
    #[serde(default = "default_db_file_name")]
    pub db_file_name: String,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_min_idle_sessions")]
    pub min_idle_sessions: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_file_name() -> String {
    "mma_meta.db".to_string()
}

fn default_max_sessions() -> usize {
    10
}

fn default_min_idle_sessions() -> usize {
    1
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            home: None,
            db_file_name: default_db_file_name(),
            max_sessions: default_max_sessions(),
            min_idle_sessions: default_min_idle_sessions(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl LedgerConfig {
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ColumnMetaModel;

    #[test]
    fn test_additional_defaults_applied() {
        let config: TableMigrationConfig = serde_json::from_str(
            r#"{
                "sourceDatabaseName": "test",
                "sourceTableName": "t",
                "destProjectName": "p",
                "destTableName": "t"
            }"#,
        )
        .unwrap();
        assert_eq!(config.retry_times_limit(), 1);
        assert_eq!(config.additional_table_config.partition_group_size, 50);
        assert!(config.partition_values_list.is_none());
    }

    #[test]
    fn test_json_roundtrip_preserves_partitions() {
        let config = TableMigrationConfig::new("test", "t", "p", "t")
            .with_partitions(vec![vec!["2024".to_string(), "01".to_string()]]);
        let parsed = TableMigrationConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_apply_sets_destination_names() {
        let config = TableMigrationConfig::new("Test", "Src", "Dest_Proj", "Dest_Tbl");
        let mut table = TableMetaModel::new("test", "src");
        table.columns.push(ColumnMetaModel::new("Foo", "string"));
        table.partition_columns.push(ColumnMetaModel::new("DT", "string"));

        config.apply(&mut table);

        assert_eq!(table.odps_project_name, "dest_proj");
        assert_eq!(table.odps_table_name, "dest_tbl");
        assert_eq!(table.columns[0].odps_column_name, "foo");
        assert_eq!(table.partition_columns[0].odps_column_name, "dt");
        // Source names are untouched.
        assert_eq!(table.table_name, "src");
    }

    #[test]
    fn test_ledger_config_defaults() {
        let config: LedgerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.min_idle_sessions, 1);
    }
}
