//! Ledgers over an on-disk store in a temp directory.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use migration_ledger::config::LedgerConfig;
use migration_ledger::ledger::MigrationLedger;

use super::meta_source::MockMetaSource;

pub struct LedgerHarness {
    temp_dir: TempDir,
    pub meta_source: Arc<MockMetaSource>,
}

impl LedgerHarness {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            meta_source: Arc::new(MockMetaSource::new()),
        }
    }

    pub fn config(&self) -> LedgerConfig {
        LedgerConfig::with_home(self.temp_dir.path())
    }

    /// Opens a ledger on the harness store. Reopening simulates a restart.
    pub fn open(&self) -> MigrationLedger {
        MigrationLedger::open(&self.config(), self.meta_source.clone())
            .expect("Failed to open ledger")
    }
}
