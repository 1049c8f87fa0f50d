//! SQLite dedup index
//!
//! One connection opened at startup and kept open for the process lifetime,
//! shared across worker tasks behind a mutex. All mutations are single-row
//! inserts keyed by the item identifier; the primary-key constraint rejects
//! duplicates atomically.

use crate::index::schema::initialize_schema;
use crate::index::traits::{IndexError, IndexRecord, IndexResult, IndexStore};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed dedup index
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Opens (or creates) the index database at `path`
    pub fn open(path: &Path) -> IndexResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory index (for tests)
    pub fn open_in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> IndexResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| IndexError::LockPoisoned)
    }
}

impl IndexStore for SqliteIndex {
    fn exists(&self, id: &str) -> IndexResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM info WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, id: &str, time: i64, location: Option<&str>) -> IndexResult<()> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO info (id, location, time) VALUES (?1, ?2, ?3)",
            params![id, location, time],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(IndexError::DuplicateKey(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> IndexResult<Option<IndexRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT id, time, location FROM info WHERE id = ?1",
                params![id],
                |row| {
                    Ok(IndexRecord {
                        id: row.get(0)?,
                        time: row.get(1)?,
                        location: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn count(&self) -> IndexResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM info", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
