//! SQLite backing store
//!
//! This module provides a SQLite-based implementation of the BackingStore trait.

use crate::state::{CrawlRecord, CrawlStatus};
use crate::store::schema::initialize_schema;
use crate::store::traits::{BackingStore, StorageError, StorageResult};
use crate::url::{PartitionId, Partitioner, UrlKey};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// SQLite backing store for one partition
///
/// Several partitions may open the same file; each only reads back the rows its
/// partition owns. Rows written under a different partition count are re-homed by
/// host when loaded, so changing the partition count does not lose state.
pub struct SqliteBackingStore {
    conn: Connection,
    partition: PartitionId,
}

/// A row as stored, before it is checked
struct StoredRow {
    url: String,
    status: String,
    score: f64,
    last_fetch_time: Option<String>,
    next_fetch_time: Option<String>,
    attempts: u32,
    discovered_depth: u32,
    fetch_started_at: Option<String>,
}

impl SqliteBackingStore {
    /// Opens or creates the database at `path`
    pub fn open(path: &Path, partition: PartitionId) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        // Partitions sharing a file take turns writing
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self { conn, partition })
    }

    /// Creates an in-memory database
    pub fn open_in_memory(partition: PartitionId) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn, partition })
    }

    /// Counts the rows in the database, across all partitions
    pub fn count_rows(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawl_state", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn decode(&self, row: StoredRow) -> StorageResult<(UrlKey, CrawlRecord)> {
        let corrupt = |reason: String| StorageError::Corrupt {
            url: row.url.clone(),
            reason,
        };

        let key = UrlKey::parse(&row.url).map_err(|e| corrupt(e.to_string()))?;
        let status = CrawlStatus::from_db_string(&row.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", row.status)))?;

        let record = CrawlRecord {
            status,
            score: row.score,
            last_fetch_time: parse_time(row.last_fetch_time.as_deref()).map_err(corrupt)?,
            next_fetch_time: parse_time(row.next_fetch_time.as_deref()).map_err(corrupt)?,
            attempts: row.attempts,
            discovered_depth: row.discovered_depth,
            fetch_started_at: parse_time(row.fetch_started_at.as_deref()).map_err(corrupt)?,
        };

        Ok((key, record))
    }
}

impl BackingStore for SqliteBackingStore {
    fn persist(&mut self, key: &UrlKey, record: &CrawlRecord) -> StorageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO crawl_state
             (url, host, partition_index, partition_count, status, score, last_fetch_time,
              next_fetch_time, attempts, discovered_depth, fetch_started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        stmt.execute(params![
            key.as_str(),
            key.host(),
            self.partition.index(),
            self.partition.count(),
            record.status.to_db_string(),
            record.score,
            record.last_fetch_time.map(|t| t.to_rfc3339()),
            record.next_fetch_time.map(|t| t.to_rfc3339()),
            record.attempts,
            record.discovered_depth,
            record.fetch_started_at.map(|t| t.to_rfc3339()),
            Utc::now().to_rfc3339(),
        ])?;

        Ok(())
    }

    fn load_all(&mut self) -> StorageResult<Vec<(UrlKey, CrawlRecord)>> {
        let partitioner = Partitioner::new(self.partition.count())
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut stmt = self.conn.prepare(
            "SELECT url, status, score, last_fetch_time, next_fetch_time, attempts,
             discovered_depth, fetch_started_at
             FROM crawl_state
             WHERE partition_count <> ?2 OR partition_index = ?1",
        )?;

        let rows = stmt
            .query_map(
                params![self.partition.index(), self.partition.count()],
                |row| {
                    Ok(StoredRow {
                        url: row.get(0)?,
                        status: row.get(1)?,
                        score: row.get(2)?,
                        last_fetch_time: row.get(3)?,
                        next_fetch_time: row.get(4)?,
                        attempts: row.get(5)?,
                        discovered_depth: row.get(6)?,
                        fetch_started_at: row.get(7)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match self.decode(row) {
                Ok((key, record)) => {
                    if partitioner.partition_of(&key) == self.partition {
                        records.push((key, record));
                    }
                }
                Err(e) => warn!("Skipping unreadable row in partition {}: {}", self.partition, e),
            }
        }

        Ok(records)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Returns a status row; the values are not needed
        self.conn
            .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
        Ok(())
    }
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| format!("bad timestamp '{}': {}", s, e))
        })
        .transpose()
}
