use crate::state::CrawlRecord;
use crate::store::traits::{BackingStore, StorageError, StorageResult};
use crate::url::UrlKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-process backing store
///
/// Clones share the same map, so a test can keep a handle, drop the partition
/// that wrote through it, and reopen a new partition on the same data to simulate
/// a restart. Writes can be made to fail on demand.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackingStore {
    records: Arc<Mutex<HashMap<UrlKey, CrawlRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `persist` fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the durable copy of a record
    pub fn get(&self, key: &UrlKey) -> Option<CrawlRecord> {
        self.records.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<UrlKey, CrawlRecord>>> {
        self.records
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl BackingStore for MemoryBackingStore {
    fn persist(&mut self, key: &UrlKey, record: &CrawlRecord) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        self.lock()?.insert(key.clone(), record.clone());
        Ok(())
    }

    fn load_all(&mut self) -> StorageResult<Vec<(UrlKey, CrawlRecord)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
