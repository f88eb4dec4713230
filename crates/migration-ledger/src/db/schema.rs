//! Store schema: versioned bootstrap of the fixed tables plus on-demand
//! creation of the per-table partition collections.
//!
//! Applied versions are tracked in a `_migrations` table and pending ones
//! run in order. Partition collections are not migrations: they are created
//! right before the first partition write for a table and dropped with the
//! table's job.

use rusqlite::{params, Connection, OptionalExtension};

use super::error::StoreError;

pub const TABLE_META: &str = "mma_table_meta";
const PARTITION_TABLE_PREFIX: &str = "mma_pt_meta";

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_table_meta",
        sql: "CREATE TABLE IF NOT EXISTS mma_table_meta (
                db_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                is_partitioned INTEGER NOT NULL,
                migration_config TEXT NOT NULL,
                status TEXT NOT NULL,
                attempt_times INTEGER NOT NULL DEFAULT 0,
                last_succ_timestamp INTEGER NOT NULL DEFAULT -1,
                PRIMARY KEY (db_name, table_name)
            );
            CREATE INDEX IF NOT EXISTS idx_table_meta_status ON mma_table_meta (status);",
    },
    Migration {
        version: 2,
        description: "create_partition_catalogs",
        sql: "CREATE TABLE IF NOT EXISTS mma_pt_namespaces (
                db_name TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS mma_pt_tables (
                db_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                PRIMARY KEY (db_name, table_name)
            );",
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Quotes an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Deterministic, quoted name of the partition collection for `(db, table)`.
///
/// Dots inside either name are percent-escaped so the separator stays
/// unambiguous and distinct pairs never share a collection.
pub fn partition_table_name(db: &str, table: &str) -> String {
    quote_ident(&format!(
        "{PARTITION_TABLE_PREFIX}.{}.{}",
        escape_name_part(db),
        escape_name_part(table)
    ))
}

fn escape_name_part(part: &str) -> String {
    part.replace('%', "%25").replace('.', "%2E")
}

/// Registers the partition namespace for a source database. Idempotent.
pub fn ensure_partition_namespace(conn: &Connection, db: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO mma_pt_namespaces (db_name) VALUES (?1)",
        params![db],
    )?;
    Ok(())
}

/// Creates the partition collection for `(db, table)` if absent. Idempotent.
pub fn ensure_partition_table(conn: &Connection, db: &str, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            pt_values TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            attempt_times INTEGER NOT NULL DEFAULT 0,
            last_succ_timestamp INTEGER NOT NULL DEFAULT -1
        );",
        partition_table_name(db, table)
    ))?;
    conn.execute(
        "INSERT OR IGNORE INTO mma_pt_tables (db_name, table_name) VALUES (?1, ?2)",
        params![db, table],
    )?;
    Ok(())
}

/// Drops the partition collection for `(db, table)` and unregisters it.
pub fn drop_partition_table(conn: &Connection, db: &str, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {};",
        partition_table_name(db, table)
    ))?;
    conn.execute(
        "DELETE FROM mma_pt_tables WHERE db_name = ?1 AND table_name = ?2",
        params![db, table],
    )?;
    Ok(())
}

/// Whether the partition namespace for `db` has been registered.
pub fn has_partition_namespace(conn: &Connection, db: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM mma_pt_namespaces WHERE db_name = ?1",
            params![db],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Whether the partition collection for `(db, table)` exists.
pub fn has_partition_table(conn: &Connection, db: &str, table: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM mma_pt_tables WHERE db_name = ?1 AND table_name = ?2",
            params![db, table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Every registered partition collection as `(db, table)` pairs.
pub fn list_partition_tables(conn: &Connection) -> Result<Vec<(String, String)>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT db_name, table_name FROM mma_pt_tables ORDER BY db_name, table_name")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
