//! Builders for table migration configs.

#![allow(dead_code)]

use migration_ledger::config::{AdditionalTableConfig, TableMigrationConfig};

use super::meta_source::{DB, NON_PARTITIONED, PARTITIONED};

pub struct JobConfigBuilder {
    db: String,
    table: String,
    dest_project: String,
    dest_table: String,
    partitions: Option<Vec<Vec<String>>>,
    additional: AdditionalTableConfig,
}

impl JobConfigBuilder {
    pub fn new(db: &str, table: &str) -> Self {
        Self {
            db: db.to_string(),
            table: table.to_string(),
            dest_project: db.to_string(),
            dest_table: table.to_string(),
            partitions: None,
            additional: AdditionalTableConfig::default(),
        }
    }

    pub fn dest(mut self, project: &str, table: &str) -> Self {
        self.dest_project = project.to_string();
        self.dest_table = table.to_string();
        self
    }

    pub fn partition(mut self, values: &[&str]) -> Self {
        self.partitions
            .get_or_insert_with(Vec::new)
            .push(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.additional.retry_times_limit = limit;
        self
    }

    pub fn build(self) -> TableMigrationConfig {
        let mut config =
            TableMigrationConfig::new(&self.db, &self.table, &self.dest_project, &self.dest_table)
                .with_additional(self.additional);
        if let Some(partitions) = self.partitions {
            config = config.with_partitions(partitions);
        }
        config
    }
}

pub fn non_partitioned_config() -> TableMigrationConfig {
    JobConfigBuilder::new(DB, NON_PARTITIONED).build()
}

pub fn partitioned_config() -> TableMigrationConfig {
    JobConfigBuilder::new(DB, PARTITIONED).build()
}

pub fn partition(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
