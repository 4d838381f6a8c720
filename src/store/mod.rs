//! Crawl state store
//!
//! Each partition owns one [`CrawlStateStore`]: the authoritative map from URL key
//! to [`CrawlRecord`] for every URL whose host the partition owns. The store is
//! driven by a single writer (the partition worker) and needs no locking.
//!
//! - In-memory map, always up to date
//! - Optional [`BackingStore`] mirroring each write for recovery
//! - Reload on open, with queue membership reset (the queue itself is not durable)

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryBackingStore;
pub use sqlite::SqliteBackingStore;
pub use traits::{BackingStore, StorageError, StorageResult};

use crate::state::{CrawlRecord, CrawlStatus};
use crate::url::{PartitionId, UrlKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What happened to the durable copy of a write
#[derive(Debug)]
pub enum Durability {
    /// Written to the backing store
    Persisted,

    /// No backing store is attached
    MemoryOnly,

    /// The backing store rejected the write; the in-memory update still stands
    Failed(StorageError),
}

impl Durability {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Authoritative crawl state of one partition
pub struct CrawlStateStore {
    partition: PartitionId,
    records: HashMap<UrlKey, CrawlRecord>,
    backing: Option<Box<dyn BackingStore>>,
    write_failures: u64,
}

impl CrawlStateStore {
    /// Creates an empty store with no durable mirror
    pub fn in_memory(partition: PartitionId) -> Self {
        Self {
            partition,
            records: HashMap::new(),
            backing: None,
            write_failures: 0,
        }
    }

    /// Opens a store over a backing store, reloading its records
    ///
    /// Records found `Queued` go back to `Unfetched`, since the queue they were in
    /// did not survive. `Fetching` records are left alone; the stale-fetch timeout
    /// recovers them.
    ///
    /// # Errors
    ///
    /// Fails if the backing store cannot be read. A partition must not start from
    /// an empty view of state it is known to have.
    pub fn open(partition: PartitionId, mut backing: Box<dyn BackingStore>) -> StorageResult<Self> {
        let loaded = backing.load_all()?;

        let mut store = Self {
            partition,
            records: HashMap::with_capacity(loaded.len()),
            backing: Some(backing),
            write_failures: 0,
        };

        let mut requeued = 0;
        for (key, mut record) in loaded {
            if record.status == CrawlStatus::Queued {
                record.status = CrawlStatus::Unfetched;
                requeued += 1;
                store.upsert(key, record);
            } else {
                store.records.insert(key, record);
            }
        }

        info!(
            "Partition {} reloaded {} records ({} reset from queued)",
            partition,
            store.records.len(),
            requeued
        );

        Ok(store)
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn get(&self, key: &UrlKey) -> Option<&CrawlRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &UrlKey) -> bool {
        self.records.contains_key(key)
    }

    /// Inserts or replaces a record
    ///
    /// The caller has already resolved any conflict with the previous record. The
    /// in-memory map is updated first and unconditionally; a failed durable write
    /// is logged and counted but never undoes it.
    pub fn upsert(&mut self, key: UrlKey, record: CrawlRecord) -> Durability {
        let durability = match self.backing.as_mut() {
            None => Durability::MemoryOnly,
            Some(backing) => match backing.persist(&key, &record) {
                Ok(()) => Durability::Persisted,
                Err(e) => {
                    self.write_failures += 1;
                    warn!(
                        "Durable write failed for {} in partition {}: {}",
                        key, self.partition, e
                    );
                    Durability::Failed(e)
                }
            },
        };

        self.records.insert(key, record);
        durability
    }

    /// Iterates over records that may be offered to the fetch queue at `now`
    ///
    /// The iterator is lazy and borrows the store; calling this again starts a new
    /// scan. Order is unspecified.
    pub fn scan_eligible(
        &self,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = (&UrlKey, &CrawlRecord)> + '_ {
        self.records
            .iter()
            .filter(move |(_, record)| record.is_eligible(now))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UrlKey, &CrawlRecord)> + '_ {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Counts records per status
    pub fn status_counts(&self) -> HashMap<CrawlStatus, usize> {
        let mut counts = HashMap::new();
        for record in self.records.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }

    /// Durable writes that have failed since the store was opened
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn is_durable(&self) -> bool {
        self.backing.is_some()
    }

    pub fn flush(&mut self) -> StorageResult<()> {
        match self.backing.as_mut() {
            Some(backing) => backing.flush(),
            None => Ok(()),
        }
    }

    /// Flushes and releases the backing store
    pub fn close(&mut self) -> StorageResult<()> {
        let result = self.flush();
        if self.backing.take().is_some() {
            debug!("Partition {} released its backing store", self.partition);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn partition() -> PartitionId {
        PartitionId::new(0, 1).unwrap()
    }

    fn key(url: &str) -> UrlKey {
        UrlKey::parse(url).unwrap()
    }

    fn record(status: CrawlStatus) -> CrawlRecord {
        CrawlRecord {
            status,
            ..CrawlRecord::discovered(1.0, 0)
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let mut store = CrawlStateStore::in_memory(partition());
        assert!(store.get(&key("http://a.com/")).is_none());

        let durability = store.upsert(key("http://a.com/"), record(CrawlStatus::Unfetched));
        assert!(matches!(durability, Durability::MemoryOnly));
        assert_eq!(store.len(), 1);

        store.upsert(key("http://A.com/"), record(CrawlStatus::Queued));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&key("http://a.com/")).unwrap().status,
            CrawlStatus::Queued
        );
    }

    #[test]
    fn test_scan_eligible() {
        let now = Utc::now();
        let mut store = CrawlStateStore::in_memory(partition());

        store.upsert(key("http://a.com/new"), record(CrawlStatus::Unfetched));
        store.upsert(key("http://a.com/queued"), record(CrawlStatus::Queued));
        store.upsert(key("http://a.com/busy"), record(CrawlStatus::Fetching));
        store.upsert(key("http://a.com/skip"), record(CrawlStatus::Skipped));

        let mut due = record(CrawlStatus::Fetched);
        due.next_fetch_time = Some(now - Duration::seconds(1));
        store.upsert(key("http://a.com/due"), due);

        let mut later = record(CrawlStatus::Error);
        later.next_fetch_time = Some(now + Duration::hours(1));
        store.upsert(key("http://a.com/later"), later);

        let mut eligible: Vec<String> = store
            .scan_eligible(now)
            .map(|(k, _)| k.to_string())
            .collect();
        eligible.sort();
        assert_eq!(eligible, vec!["http://a.com/due", "http://a.com/new"]);

        // Restartable
        assert_eq!(store.scan_eligible(now).count(), 2);
    }

    #[test]
    fn test_status_counts() {
        let mut store = CrawlStateStore::in_memory(partition());
        store.upsert(key("http://a.com/1"), record(CrawlStatus::Unfetched));
        store.upsert(key("http://a.com/2"), record(CrawlStatus::Unfetched));
        store.upsert(key("http://a.com/3"), record(CrawlStatus::Fetched));

        let counts = store.status_counts();
        assert_eq!(counts.get(&CrawlStatus::Unfetched), Some(&2));
        assert_eq!(counts.get(&CrawlStatus::Fetched), Some(&1));
        assert_eq!(counts.get(&CrawlStatus::Queued), None);
    }

    #[test]
    fn test_reload_resets_queued() {
        let backing = MemoryBackingStore::new();

        {
            let mut store = CrawlStateStore::open(partition(), Box::new(backing.clone())).unwrap();
            assert!(store.is_durable());
            let d = store.upsert(key("http://a.com/q"), record(CrawlStatus::Queued));
            assert!(matches!(d, Durability::Persisted));
            store.upsert(key("http://a.com/f"), record(CrawlStatus::Fetched));
            store.upsert(key("http://a.com/busy"), record(CrawlStatus::Fetching));
            store.close().unwrap();
        }

        let store = CrawlStateStore::open(partition(), Box::new(backing.clone())).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.get(&key("http://a.com/q")).unwrap().status,
            CrawlStatus::Unfetched
        );
        assert_eq!(
            store.get(&key("http://a.com/f")).unwrap().status,
            CrawlStatus::Fetched
        );
        assert_eq!(
            store.get(&key("http://a.com/busy")).unwrap().status,
            CrawlStatus::Fetching
        );
        // The reset is mirrored too
        assert_eq!(
            backing.get(&key("http://a.com/q")).unwrap().status,
            CrawlStatus::Unfetched
        );
    }

    #[test]
    fn test_failed_write_keeps_memory_update() {
        let backing = MemoryBackingStore::new();
        let mut store = CrawlStateStore::open(partition(), Box::new(backing.clone())).unwrap();

        backing.set_fail_writes(true);
        let durability = store.upsert(key("http://a.com/"), record(CrawlStatus::Unfetched));

        assert!(durability.is_failed());
        assert_eq!(store.write_failures(), 1);
        assert!(store.get(&key("http://a.com/")).is_some());
        assert!(backing.is_empty());
    }

    struct UnreadableStore;

    impl BackingStore for UnreadableStore {
        fn persist(&mut self, _: &UrlKey, _: &CrawlRecord) -> StorageResult<()> {
            Ok(())
        }

        fn load_all(&mut self) -> StorageResult<Vec<(UrlKey, CrawlRecord)>> {
            Err(StorageError::Unavailable("offline".to_string()))
        }

        fn flush(&mut self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_fails_when_backing_unreadable() {
        let result = CrawlStateStore::open(partition(), Box::new(UnreadableStore));
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn test_sqlite_recovery() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let backing = SqliteBackingStore::open(&path, partition()).unwrap();
            let mut store = CrawlStateStore::open(partition(), Box::new(backing)).unwrap();
            store.upsert(key("http://a.com/"), record(CrawlStatus::Queued));
            store.upsert(key("http://b.com/"), record(CrawlStatus::Fetched));
            store.close().unwrap();
        }

        let backing = SqliteBackingStore::open(&path, partition()).unwrap();
        let store = CrawlStateStore::open(partition(), Box::new(backing)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(&key("http://a.com/")).unwrap().status,
            CrawlStatus::Unfetched
        );
    }
}
