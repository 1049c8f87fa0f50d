//! Persistent dedup index
//!
//! The durable set of item identifiers already fetched successfully. This is
//! the authoritative dedup source of truth; the on-disk artifact check in the
//! crawl loop is only a secondary guard for crash recovery.

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteIndex;
pub use traits::{IndexError, IndexRecord, IndexResult, IndexStore};
