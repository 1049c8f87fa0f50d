//! Dedup index trait and error types

use thiserror::Error;

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Duplicate item id: {0}")]
    DuplicateKey(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Index connection lock poisoned")]
    LockPoisoned,
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// One row of the dedup index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// Item identifier (unique key)
    pub id: String,

    /// Fetch timestamp, epoch seconds
    pub time: i64,

    /// Optional location metadata (artifact path)
    pub location: Option<String>,
}

/// Authoritative record of item identifiers already processed
///
/// Implementations must be safe to call from multiple worker tasks
/// concurrently. Insertion is the only mutation: records are never updated
/// or deleted, and a duplicate insert must be rejected rather than
/// overwritten.
pub trait IndexStore: Send + Sync {
    /// Returns true if a record exists for `id`
    fn exists(&self, id: &str) -> IndexResult<bool>;

    /// Inserts a new record
    ///
    /// # Errors
    ///
    /// Returns `IndexError::DuplicateKey` when a record for `id` is already
    /// present.
    fn insert(&self, id: &str, time: i64, location: Option<&str>) -> IndexResult<()>;

    /// Fetches the record for `id`, if any
    fn get(&self, id: &str) -> IndexResult<Option<IndexRecord>>;

    /// Total number of records in the index
    fn count(&self) -> IndexResult<u64>;
}
