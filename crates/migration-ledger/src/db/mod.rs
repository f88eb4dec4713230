//! Persistent store for the migration ledger.
//!
//! Uses rusqlite (SQLite) behind a bounded [`SessionPool`]. Writers run in
//! `IMMEDIATE` transactions, which SQLite executes serializably; a failed
//! sequence is rolled back as a whole before its error is returned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};

pub mod error;
pub mod job_repo;
pub mod partition_repo;
pub mod pool;
pub mod schema;

pub use error::StoreError;
pub use job_repo::MigrationJob;
pub use partition_repo::MigrationJobPartition;
pub use pool::{PoolLimits, PooledSession, SessionOptions, SessionPool};

use crate::config::LedgerConfig;

/// Environment variable naming the installation home directory.
pub const HOME_ENV_VAR: &str = "MMA_HOME";

/// Handle to the ledger database.
pub struct Store {
    pool: SessionPool,
    location: String,
}

impl Store {
    /// Opens (or creates) the store under the configured home directory and
    /// runs all pending schema migrations.
    pub fn open(config: &LedgerConfig) -> Result<Self, StoreError> {
        let home = resolve_home(config.home.as_deref())?;
        std::fs::create_dir_all(&home).map_err(|e| StoreError::Io {
            path: home.clone(),
            source: e,
        })?;
        let path = home.join(&config.db_file_name);

        let store = Self::with_options(
            SessionOptions {
                target: path.to_string_lossy().into_owned(),
                wal: true,
                busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            },
            PoolLimits {
                max_sessions: config.max_sessions,
                min_idle: config.min_idle_sessions,
                acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            },
        )?;

        log::info!("Store opened at {}", path.display());
        Ok(store)
    }

    /// Opens a private in-memory store for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_options(
            SessionOptions {
                target: format!(
                    "file:mma-ledger-{}?mode=memory&cache=shared",
                    uuid::Uuid::new_v4()
                ),
                wal: false,
                busy_timeout: Duration::from_secs(5),
            },
            PoolLimits::default(),
        )
    }

    fn with_options(options: SessionOptions, limits: PoolLimits) -> Result<Self, StoreError> {
        let location = options.target.clone();
        let pool = SessionPool::new(options, limits)?;
        {
            let session = pool.acquire()?;
            schema::run_all(&session)?;
        }
        Ok(Self { pool, location })
    }

    /// Checks out a session from the pool.
    pub fn session(&self) -> Result<PooledSession<'_>, StoreError> {
        self.pool.acquire()
    }

    /// Runs `f` on a pooled session outside any explicit transaction.
    pub fn with_session<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let session = self.pool.acquire()?;
        f(&session)
    }

    /// Runs `f` in one transaction on a pooled session.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let mut session = self.pool.acquire()?;
        in_transaction(&mut session, f)
    }

    /// Path or URI of the underlying database.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Releases idle sessions; later checkouts fail.
    pub fn close(&self) {
        self.pool.close();
        log::info!("Store at {} closed", self.location);
    }
}

/// Runs `f` inside an `IMMEDIATE` transaction on `conn`.
///
/// Commits when `f` succeeds. Otherwise rolls back and returns `f`'s error;
/// a failed rollback is logged, never returned, so the original cause is
/// what the caller sees.
pub fn in_transaction<F, T, E>(conn: &mut Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<StoreError>,
{
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StoreError::from)?;

    match f(&tx) {
        Ok(value) => {
            tx.commit().map_err(StoreError::from)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                log::error!("Transaction rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Resolves the store root: the explicit path, else `$MMA_HOME`.
pub fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf, StoreError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    match std::env::var_os(HOME_ENV_VAR) {
        Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
        _ => Err(StoreError::MissingHome { var: HOME_ENV_VAR }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_session(|conn| {
                let count: u32 =
                    conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
                assert!(count > 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_in_memory_stores_are_private() {
        let a = Store::open_in_memory().unwrap();
        let b = Store::open_in_memory().unwrap();
        a.with_session(|conn| {
            conn.execute_batch("CREATE TABLE only_in_a (x INTEGER);")?;
            Ok(())
        })
        .unwrap();
        let found = b
            .with_session(|conn| {
                Ok(conn
                    .prepare("SELECT * FROM only_in_a")
                    .is_ok())
            })
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::with_home(dir.path().join("nested"));
        let store = Store::open(&config).unwrap();
        assert!(dir.path().join("nested").join("mma_meta.db").exists());
        assert!(store.location().ends_with("mma_meta.db"));
    }

    #[test]
    fn test_transaction_commits() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_transaction(|conn| {
                conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")?;
                Ok(())
            })
            .unwrap();
        let count: i64 = store
            .with_session(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_session(|conn| {
                conn.execute_batch("CREATE TABLE t (x INTEGER);")?;
                Ok(())
            })
            .unwrap();

        let result: Result<(), StoreError> = store.with_transaction(|conn| {
            conn.execute("INSERT INTO t VALUES (1)", [])?;
            Err(StoreError::InvalidStatus("boom".to_string()))
        });
        assert!(matches!(result, Err(StoreError::InvalidStatus(_))));

        let count: i64 = store
            .with_session(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_closed_store_refuses_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&LedgerConfig::with_home(dir.path())).unwrap();
        store.close();
        assert!(matches!(store.session().err().unwrap(), StoreError::PoolClosed));
    }

    #[test]
    fn test_resolve_home_prefers_explicit() {
        let home = resolve_home(Some(Path::new("/opt/mma"))).unwrap();
        assert_eq!(home, PathBuf::from("/opt/mma"));
    }

    #[test]
    #[serial]
    fn test_resolve_home_from_env() {
        std::env::set_var(HOME_ENV_VAR, "/srv/mma");
        let home = resolve_home(None);
        std::env::remove_var(HOME_ENV_VAR);
        assert_eq!(home.unwrap(), PathBuf::from("/srv/mma"));
    }

    #[test]
    #[serial]
    fn test_resolve_home_missing() {
        std::env::remove_var(HOME_ENV_VAR);
        let err = resolve_home(None).unwrap_err();
        assert!(matches!(err, StoreError::MissingHome { var } if var == HOME_ENV_VAR));
    }
}
