//! SQLite persistence.
//!
//! A single connection is shared behind a mutex. Services borrow it for the length of one
//! operation through [`Database::with_connection`] or [`Database::with_transaction`].

pub mod migrations;
pub mod schema;

use rusqlite::types::{ToSql, Value};
use rusqlite::{Connection, Row, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::{RecordError, RecordResult};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file and brings its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns `RecordError` if the parent directory cannot be created, the file cannot be
    /// opened, or a migration fails.
    pub fn open(path: &Path) -> RecordResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(RecordError::StorageDirCreation)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Opens a private in-memory database with the full schema.
    pub fn open_in_memory() -> RecordResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn migrate(&self) -> RecordResult<()> {
        self.with_connection(migrations::run_migrations)
    }

    pub fn with_connection<F, T>(&self, f: F) -> RecordResult<T>
    where
        F: FnOnce(&Connection) -> RecordResult<T>,
    {
        let conn = self.conn.lock().map_err(|_| RecordError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction, committing only if it returns `Ok`.
    pub fn with_transaction<F, T>(&self, f: F) -> RecordResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> RecordResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| RecordError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

// ============================================================================
// ROW HELPERS
// ============================================================================

/// Reads a text column and parses it with `FromStr` (used for wire enums).
pub(crate) fn parse_column<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Like [`parse_column`] for nullable columns.
pub(crate) fn parse_optional_column<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(column)?;
    raw.map(|r| {
        r.parse::<T>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Reads a JSON document column.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Converts any `ToSql` value into an owned `Value` so column lists can be built dynamically.
pub(crate) fn sql_value<T: ToSql>(value: T) -> Value {
    match value.to_sql() {
        Ok(rusqlite::types::ToSqlOutput::Owned(v)) => v,
        Ok(rusqlite::types::ToSqlOutput::Borrowed(v)) => v.into(),
        _ => Value::Null,
    }
}

/// `true` if the error is a violated UNIQUE constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Returns `Ok(None)` for "no rows", otherwise propagates.
pub(crate) fn optional_row<T>(result: rusqlite::Result<T>) -> RecordResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

