pub mod action;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod meta;

pub use action::{Action, ActionError, ActionProgress, SqlAction, SqlActionInfo, SqlExecutor, SqlRequest};
pub use config::{
    load_config, load_job_configs, AdditionalTableConfig, LedgerConfig, TableMigrationConfig,
};
pub use db::{MigrationJob, MigrationJobPartition, Store, StoreError};
pub use error::{ConfigError, MigrationError, Result};
pub use ledger::{
    ErrorKind, LedgerError, MigrationLedger, MigrationProgress, MigrationStatus, RecoveryReport,
};
pub use meta::{ColumnMetaModel, MetaSource, MetaSourceError, PartitionMetaModel, TableMetaModel};
