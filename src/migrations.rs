//! Versioned schema for the cohort store.
//!
//! Each step is an embedded SQL file applied once, in order, inside its own
//! transaction. The highest applied step is recorded in `schema_version`.

use rusqlite::{Connection, DatabaseName};

use crate::db::DbError;

struct SchemaStep {
    version: i32,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Bring the schema up to date. Returns how many steps were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, DbError> {
    apply_steps(conn, SCHEMA_STEPS)
}

fn apply_steps(conn: &Connection, steps: &[SchemaStep]) -> Result<usize, DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let installed = installed_version(conn)?;
    let newest = steps.iter().map(|s| s.version).max().unwrap_or(0);
    if installed > newest {
        return Err(DbError::Migration(format!(
            "schema v{} is newer than the v{} this build understands",
            installed, newest
        )));
    }

    let pending: Vec<&SchemaStep> = steps.iter().filter(|s| s.version > installed).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    // A v0 database has no cohort data yet.
    if installed > 0 {
        snapshot(conn, installed)?;
    }

    for step in &pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(step.sql)
            .map_err(|e| DbError::Migration(format!("step v{}: {}", step.version, e)))?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [step.version],
        )?;
        tx.commit()?;
        log::info!("Schema upgraded to v{}", step.version);
    }

    Ok(pending.len())
}

fn installed_version(conn: &Connection) -> Result<i32, DbError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Copy a file database to `<path>.v<version>.bak` before upgrading it.
/// In-memory databases have nothing to keep.
fn snapshot(conn: &Connection, version: i32) -> Result<(), DbError> {
    let file: String = conn.query_row(
        "SELECT file FROM pragma_database_list WHERE name = 'main'",
        [],
        |row| row.get(0),
    )?;
    if file.is_empty() {
        return Ok(());
    }

    let target = format!("{}.v{}.bak", file, version);
    conn.backup(DatabaseName::Main, &target, None)
        .map_err(|e| DbError::Migration(format!("snapshot of v{} failed: {}", version, e)))?;
    log::info!("Saved v{} snapshot to {}", version, target);
    Ok(())
}
