//! Database schema for the SQLite backing store

/// SQL schema for the database
///
/// All partitions can share one database file. Rows carry the partition layout
/// they were written under so a store can find its own rows cheaply.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per URL key
CREATE TABLE IF NOT EXISTS crawl_state (
    url TEXT PRIMARY KEY,
    host TEXT NOT NULL,
    partition_index INTEGER NOT NULL,
    partition_count INTEGER NOT NULL,
    status TEXT NOT NULL,
    score REAL NOT NULL,
    last_fetch_time TEXT,
    next_fetch_time TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    discovered_depth INTEGER NOT NULL,
    fetch_started_at TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_state_partition
    ON crawl_state(partition_count, partition_index);
CREATE INDEX IF NOT EXISTS idx_crawl_state_status ON crawl_state(status);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
        [get_schema_version().to_string()],
    )?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
