//! URL lifecycle observation
//!
//! A [`CrawlObserver`] is handed to every partition and called at each point
//! where a URL's crawl state changes in a way worth recording. Every method has a
//! no-op default, so an observer only implements what it cares about.

use crate::frontier::RejectReason;
use crate::state::CrawlStatus;
use crate::store::StorageError;
use crate::url::{PartitionId, UrlKey};
use tracing::{debug, info, trace, warn};

/// Receives URL lifecycle events from the partitions
///
/// Methods are called from the partition's worker task while it holds its state,
/// so implementations should return quickly.
pub trait CrawlObserver: Send + Sync {
    /// A URL was seen for the first time
    fn on_discovered(&self, _partition: PartitionId, _key: &UrlKey, _depth: u32) {}

    /// A record changed status; `from` is None for a new record
    fn on_status_change(
        &self,
        _partition: PartitionId,
        _key: &UrlKey,
        _from: Option<CrawlStatus>,
        _to: CrawlStatus,
    ) {
    }

    /// A URL entered the fetch queue
    fn on_queued(&self, _partition: PartitionId, _key: &UrlKey, _score: f64) {}

    /// A queued URL lost its slot to a higher-scored one
    fn on_evicted(&self, _partition: PartitionId, _key: &UrlKey) {}

    /// The fetch queue turned a URL away
    fn on_rejected(&self, _partition: PartitionId, _key: &UrlKey, _reason: RejectReason) {}

    /// A fetch produced no outcome within the fetch timeout
    fn on_stale_timeout(&self, _partition: PartitionId, _key: &UrlKey) {}

    /// The backing store did not accept a write
    fn on_durable_write_failure(
        &self,
        _partition: PartitionId,
        _key: &UrlKey,
        _error: &StorageError,
    ) {
    }
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CrawlObserver for NoopObserver {}

/// Observer that writes URL lifecycle events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CrawlObserver for TracingObserver {
    fn on_discovered(&self, partition: PartitionId, key: &UrlKey, depth: u32) {
        debug!("[{}] discovered {} at depth {}", partition, key, depth);
    }

    fn on_status_change(
        &self,
        partition: PartitionId,
        key: &UrlKey,
        from: Option<CrawlStatus>,
        to: CrawlStatus,
    ) {
        match from {
            Some(from) => debug!("[{}] {} {} -> {}", partition, key, from, to),
            None => debug!("[{}] {} new as {}", partition, key, to),
        }
    }

    fn on_queued(&self, partition: PartitionId, key: &UrlKey, score: f64) {
        trace!("[{}] queued {} (score {})", partition, key, score);
    }

    fn on_evicted(&self, partition: PartitionId, key: &UrlKey) {
        debug!("[{}] evicted {} from the fetch queue", partition, key);
    }

    fn on_rejected(&self, partition: PartitionId, key: &UrlKey, reason: RejectReason) {
        trace!("[{}] queue rejected {}: {}", partition, key, reason);
    }

    fn on_stale_timeout(&self, partition: PartitionId, key: &UrlKey) {
        info!("[{}] fetch of {} timed out", partition, key);
    }

    fn on_durable_write_failure(&self, partition: PartitionId, key: &UrlKey, error: &StorageError) {
        warn!("[{}] durable write for {} failed: {}", partition, key, error);
    }
}
