use crate::config::MergeConfig;
use crate::frontier::{FetchQueue, OfferResult, QueuedUrl, RejectReason};
use crate::merge::event::{CompletionStatus, UrlUpdate};
use crate::merge::resolve::{apply_completion, collapse, resolve};
use crate::observer::CrawlObserver;
use crate::robots::RobotsPolicy;
use crate::state::{CrawlRecord, CrawlStatus};
use crate::store::{CrawlStateStore, Durability};
use crate::url::{PartitionId, UrlKey};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Counts from one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Buffered updates drained
    pub drained: usize,

    /// Keys whose record was written
    pub applied: usize,

    /// Records created
    pub created: usize,

    pub queued: usize,
    pub evicted: usize,

    /// Candidates the queue turned away
    pub rejected: usize,

    pub robots_denied: usize,
    pub stale_timeouts: usize,
    pub write_failures: usize,
}

impl MergeReport {
    /// Adds another report's counts to this one
    pub fn accumulate(&mut self, other: &MergeReport) {
        self.drained += other.drained;
        self.applied += other.applied;
        self.created += other.created;
        self.queued += other.queued;
        self.evicted += other.evicted;
        self.rejected += other.rejected;
        self.robots_denied += other.robots_denied;
        self.stale_timeouts += other.stale_timeouts;
        self.write_failures += other.write_failures;
    }
}

/// Reconciles buffered updates with a partition's store and refills its queue
///
/// Updates are only buffered by [`add`](Self::add); nothing reaches the store or
/// the queue until the next [`merge`](Self::merge).
pub struct MergeEngine {
    partition: PartitionId,
    config: MergeConfig,
    buffer: Vec<(UrlKey, UrlUpdate)>,
    robots: Arc<dyn RobotsPolicy>,
    observer: Arc<dyn CrawlObserver>,
}

impl MergeEngine {
    pub fn new(
        partition: PartitionId,
        config: MergeConfig,
        robots: Arc<dyn RobotsPolicy>,
        observer: Arc<dyn CrawlObserver>,
    ) -> Self {
        Self {
            partition,
            config,
            buffer: Vec::new(),
            robots,
            observer,
        }
    }

    /// Buffers an update for the next merge
    pub fn add(&mut self, key: UrlKey, update: UrlUpdate) {
        self.buffer.push((key, update));
    }

    /// Updates waiting for the next merge
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Runs one merge
    ///
    /// # Merge Steps
    ///
    /// 1. Drain the buffer and collapse it per key
    /// 2. Resolve each key against its stored record and write the result
    /// 3. Fail fetches that have been running longer than the fetch timeout
    /// 4. Offer eligible records to the queue, best score first, until it is full
    pub async fn merge(
        &mut self,
        store: &mut CrawlStateStore,
        queue: &FetchQueue,
        now: DateTime<Utc>,
    ) -> MergeReport {
        let mut report = MergeReport::default();

        let drained = std::mem::take(&mut self.buffer);
        report.drained = drained.len();
        self.apply_updates(store, queue, drained, now, &mut report);
        self.expire_stale_fetches(store, now, &mut report);
        self.refill(store, queue, now, &mut report).await;

        debug!(
            "Partition {} merge: drained={} applied={} created={} queued={} evicted={} \
             robots_denied={} stale={} queue={}/{}",
            self.partition,
            report.drained,
            report.applied,
            report.created,
            report.queued,
            report.evicted,
            report.robots_denied,
            report.stale_timeouts,
            queue.size(),
            queue.capacity()
        );

        report
    }

    fn apply_updates(
        &self,
        store: &mut CrawlStateStore,
        queue: &FetchQueue,
        updates: Vec<(UrlKey, UrlUpdate)>,
        now: DateTime<Utc>,
        report: &mut MergeReport,
    ) {
        for (key, update) in collapse(updates) {
            let Some(resolution) = resolve(store.get(&key), &update, &self.config, now) else {
                continue;
            };

            if resolution.is_new() {
                report.created += 1;
                if update.discovery.is_some() {
                    self.observer.on_discovered(
                        self.partition,
                        &key,
                        resolution.record.discovered_depth,
                    );
                }
            }

            // Only `Queued` records may wait in the queue, e.g. a late completion
            // for a URL that was requeued after its fetch timed out
            if resolution.record.status != CrawlStatus::Queued && queue.remove(&key).is_some() {
                debug!("Partition {} withdrew {} from the queue", self.partition, key);
            }

            if store.get(&key) != Some(&resolution.record) {
                report.applied += 1;
                self.write(store, key, resolution.record, resolution.previous, report);
            }
        }
    }

    fn expire_stale_fetches(
        &self,
        store: &mut CrawlStateStore,
        now: DateTime<Utc>,
        report: &mut MergeReport,
    ) {
        let timeout = self.config.fetch_timeout();
        let stale: Vec<UrlKey> = store
            .iter()
            .filter(|(_, record)| record.is_stale_fetch(now, timeout))
            .map(|(key, _)| key.clone())
            .collect();

        let timed_out = CompletionStatus::TransientError("fetch timed out".to_string());
        for key in stale {
            let Some(mut record) = store.get(&key).cloned() else {
                continue;
            };
            apply_completion(&mut record, &timed_out, now, &self.config);

            report.stale_timeouts += 1;
            self.observer.on_stale_timeout(self.partition, &key);
            self.write(store, key, record, Some(CrawlStatus::Fetching), report);
        }
    }

    async fn refill(
        &self,
        store: &mut CrawlStateStore,
        queue: &FetchQueue,
        now: DateTime<Utc>,
        report: &mut MergeReport,
    ) {
        let mut candidates: Vec<QueuedUrl> = store
            .scan_eligible(now)
            .filter(|(_, record)| record.discovered_depth <= self.config.max_depth)
            .map(|(key, record)| QueuedUrl {
                key: key.clone(),
                score: record.score,
                depth: record.discovered_depth,
            })
            .collect();

        candidates.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.key.cmp(&b.key),
            other => other,
        });

        for candidate in candidates {
            let Some(current) = store.get(&candidate.key).cloned() else {
                continue;
            };

            if !self.robots.is_allowed(&candidate.key).await {
                report.robots_denied += 1;
                let previous = current.status;
                let mut record = current;
                apply_completion(&mut record, &CompletionStatus::RobotsDenied, now, &self.config);
                self.write(store, candidate.key, record, Some(previous), report);
                continue;
            }

            let key = candidate.key.clone();
            match queue.offer(candidate) {
                OfferResult::Accepted { evicted } => {
                    report.queued += 1;
                    self.observer.on_queued(self.partition, &key, current.score);
                    let previous = current.status;
                    self.write(
                        store,
                        key,
                        CrawlRecord {
                            status: CrawlStatus::Queued,
                            ..current
                        },
                        Some(previous),
                        report,
                    );

                    if let Some(evicted) = evicted {
                        report.evicted += 1;
                        self.observer.on_evicted(self.partition, &evicted.key);
                        self.unqueue(store, evicted.key, report);
                    }
                }
                OfferResult::Rejected(RejectReason::Duplicate) => {
                    // Already waiting in the queue; make the record say so
                    report.rejected += 1;
                    self.observer
                        .on_rejected(self.partition, &key, RejectReason::Duplicate);
                    let previous = current.status;
                    self.write(
                        store,
                        key,
                        CrawlRecord {
                            status: CrawlStatus::Queued,
                            ..current
                        },
                        Some(previous),
                        report,
                    );
                }
                OfferResult::Rejected(reason) => {
                    // Full or closed: everything after this scores no higher
                    report.rejected += 1;
                    self.observer.on_rejected(self.partition, &key, reason);
                    break;
                }
            }
        }
    }

    /// Returns an evicted record to `Unfetched`
    fn unqueue(&self, store: &mut CrawlStateStore, key: UrlKey, report: &mut MergeReport) {
        let Some(record) = store.get(&key).cloned() else {
            return;
        };
        if record.status != CrawlStatus::Queued {
            return;
        }
        self.write(
            store,
            key,
            CrawlRecord {
                status: CrawlStatus::Unfetched,
                ..record
            },
            Some(CrawlStatus::Queued),
            report,
        );
    }

    fn write(
        &self,
        store: &mut CrawlStateStore,
        key: UrlKey,
        record: CrawlRecord,
        previous: Option<CrawlStatus>,
        report: &mut MergeReport,
    ) {
        if previous != Some(record.status) {
            self.observer
                .on_status_change(self.partition, &key, previous, record.status);
        }

        if let Durability::Failed(e) = store.upsert(key.clone(), record) {
            report.write_failures += 1;
            self.observer
                .on_durable_write_failure(self.partition, &key, &e);
        }
    }
}
