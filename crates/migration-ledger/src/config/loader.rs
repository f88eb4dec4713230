use std::path::Path;

use crate::config::schema::{LedgerConfig, TableMigrationConfig};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LedgerConfig, ConfigError> {
    let content = read(path.as_ref())?;
    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<LedgerConfig, ConfigError> {
    let config: LedgerConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads a JSON array of table migration configs.
pub fn load_job_configs<P: AsRef<Path>>(path: P) -> Result<Vec<TableMigrationConfig>, ConfigError> {
    let content = read(path.as_ref())?;
    load_job_configs_from_str(&content)
}

pub fn load_job_configs_from_str(content: &str) -> Result<Vec<TableMigrationConfig>, ConfigError> {
    let configs: Vec<TableMigrationConfig> = serde_json::from_str(content)?;
    for (i, config) in configs.iter().enumerate() {
        validate_job_config(config).map_err(|e| match e {
            ConfigError::Validation { message } => ConfigError::Validation {
                message: format!("job config #{}: {}", i, message),
            },
            other => other,
        })?;
    }
    Ok(configs)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn validate_config(config: &LedgerConfig) -> Result<(), ConfigError> {
    if config.db_file_name.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "dbFileName must not be empty".to_string(),
        });
    }

    if config.max_sessions == 0 {
        return Err(ConfigError::Validation {
            message: "maxSessions must be at least 1".to_string(),
        });
    }

    if config.min_idle_sessions == 0 || config.min_idle_sessions > config.max_sessions {
        return Err(ConfigError::Validation {
            message: format!(
                "minIdleSessions must be between 1 and maxSessions ({}), got {}",
                config.max_sessions, config.min_idle_sessions
            ),
        });
    }

    Ok(())
}

fn validate_job_config(config: &TableMigrationConfig) -> Result<(), ConfigError> {
    let required = [
        ("sourceDatabaseName", &config.source_database_name),
        ("sourceTableName", &config.source_table_name),
        ("destProjectName", &config.dest_project_name),
        ("destTableName", &config.dest_table_name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", field),
            });
        }
    }

    if let Some(partitions) = &config.partition_values_list {
        if partitions.iter().any(|values| values.is_empty()) {
            return Err(ConfigError::Validation {
                message: "partitionValuesList must not contain empty value lists".to_string(),
            });
        }
    }

    Ok(())
}
