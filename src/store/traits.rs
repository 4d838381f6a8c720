//! Backing store trait and error types
//!
//! A backing store mirrors one partition's crawl state so it survives restarts.
//! The in-memory map in [`CrawlStateStore`](crate::store::CrawlStateStore) stays
//! authoritative while the partition runs; the backing store is read only on open.

use crate::state::CrawlRecord;
use crate::url::UrlKey;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt record for {url}: {reason}")]
    Corrupt { url: String, reason: String },

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable mirror of one partition's crawl records
///
/// Implementations only ever see the records of the partition they were opened
/// for, and are driven by a single owner, so they need `Send` but not `Sync`.
pub trait BackingStore: Send {
    /// Writes one record, replacing any previous version
    fn persist(&mut self, key: &UrlKey, record: &CrawlRecord) -> StorageResult<()>;

    /// Returns every record that belongs to this store's partition
    fn load_all(&mut self) -> StorageResult<Vec<(UrlKey, CrawlRecord)>>;

    /// Makes previous writes durable
    fn flush(&mut self) -> StorageResult<()>;
}
