use std::path::Path;

use anyhow::{Context, Result};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::config::DatabaseConfig;
use crate::errors::WebResult;

#[derive(Clone)]
pub struct Database {
    pub pool: r2d2::Pool<SqliteConnectionManager>,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::open(&config.path)
    }

    /// Open (creating if needed) the database file and bring the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating database directory {}", parent.display()))?;
        }
        // Deletes are cascaded by hand, so the foreign keys must be enforced on every connection
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = r2d2::Pool::new(manager)?;
        let me = Self { pool };
        me.migrate()?;
        Ok(me)
    }

    /// Migrate the database to the latest version.
    fn migrate(&self) -> Result<()> {
        let migrations = [include_str!("migrations/01-initial.sql")];
        // Find the current migration version. If it fails, we need to run all the migrations.
        let mut conn = self.pool.get()?;
        let current_version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                rusqlite::params![],
                |row| row.get(0),
            )
            .unwrap_or("0".to_string());
        let current_version = current_version.parse::<usize>().unwrap_or(0);
        tracing::warn!("Current schema version: {}", current_version);
        for (offset, migration) in migrations.iter().enumerate().skip(current_version) {
            tracing::warn!("Applying migration {}", offset + 1);
            let tx = conn.transaction()?;
            tx.execute_batch(migration)
                .with_context(|| format!("Applying migration {}", offset + 1))?;
            tx.commit()?;
        }
        Ok(())
    }

    /// Convenience method to collect rows from a query into a Vec.
    pub fn collect_rows<T: FromRow, P: rusqlite::Params>(
        &self,
        sql: &str,
        parameters: P,
    ) -> Result<Vec<T>> {
        let conn = self.pool.get()?;
        Ok(query_rows(&conn, sql, parameters)?)
    }

    /// Run `body` inside a write transaction, committing only if it succeeds.
    ///
    /// The write lock is taken up front, so concurrent writers queue on the busy
    /// timeout instead of failing halfway through.
    pub fn transaction<T>(&self, body: impl FnOnce(&Transaction) -> WebResult<T>) -> WebResult<T> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = body(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Collect rows from a query on a specific connection, such as an open transaction.
pub fn query_rows<T: FromRow, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    parameters: P,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query(parameters)?;
    rows.mapped(T::from_row).collect()
}

/// Whether a query returns at least one row.
pub fn exists<P: rusqlite::Params>(conn: &Connection, sql: &str, parameters: P) -> rusqlite::Result<bool> {
    conn.prepare(sql)?.exists(parameters)
}

pub trait FromRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self>
    where
        Self: Sized;
}

/// A throwaway database in a temporary directory, for tests.
#[cfg(test)]
pub(crate) fn temporary() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("test.db")).unwrap();
    (dir, db)
}
