pub mod loader;
pub mod schema;

pub use loader::{
    load_config, load_config_from_str, load_job_configs, load_job_configs_from_str,
};
pub use schema::{AdditionalTableConfig, LedgerConfig, TableMigrationConfig};
