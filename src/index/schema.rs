//! Dedup index schema

/// SQL schema for the index database
///
/// The primary key on `id` is the sole concurrency guard for inserts.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS info (
    id TEXT PRIMARY KEY,
    location TEXT,
    time INTEGER NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
