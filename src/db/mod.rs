//! SQLite store for cohort rule definitions and cohort membership.
//!
//! The database lives at `~/.cohortrules/cohortrules.db` by default. Besides
//! the cohort tables it carries the user and hierarchy tables that compiled
//! rule predicates read, under the `mdl_` prefix.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

mod cohorts;
mod members;
pub mod types;
pub use types::*;

pub struct CohortDb {
    conn: Connection,
}

impl CohortDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(DbError::from)?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT").map_err(DbError::from)?;
                Ok(val)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::prepare(conn)
    }

    /// Open a private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DbError> {
        crate::migrations::run_migrations(&conn)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.cohortrules/cohortrules.db`.
    pub fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(default_path_under(&home))
    }
}

fn default_path_under(home: &Path) -> PathBuf {
    home.join(".cohortrules").join("cohortrules.db")
}


// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    #[test]
    fn test_open_in_memory_applies_schema() {
        let db = CohortDb::open_in_memory().expect("open");
        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM mdl_cohort", [], |row| row.get(0))
            .expect("cohort table");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_at_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("cohorts.db");
        CohortDb::open_at(path.clone()).expect("open nested");
        assert!(path.exists());
    }

    #[test]
    fn test_default_path_layout() {
        let path = default_path_under(Path::new("/home/learner"));
        assert_eq!(path, PathBuf::from("/home/learner/.cohortrules/cohortrules.db"));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = test_db();
        let result: Result<(), DbError> = db.with_transaction(|tx| {
            insert_user(tx, 1, 100);
            Err(DbError::Migration("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM mdl_user", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "insert should have been rolled back");
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = test_db();
        let result: Result<i64, DbError> = db.with_transaction(|tx| {
            insert_user(tx, 7, 100);
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM mdl_user", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
