//! Partition worker
//!
//! One [`PartitionWorker`] owns one partition: its crawl state store, its merge
//! engine and the producing side of its fetch queue. It consumes two event streams,
//! discoveries routed to it by host and fetch signals from its own fetch workers,
//! and decides when to merge them.
//!
//! # Lifecycle
//!
//! ```text
//! INIT --open--> OPEN --first tick--> RUNNING --close--> CLOSING --> CLOSED
//! ```
//!
//! Events are accepted while `OPEN` or `RUNNING`. `close` runs a final merge, shuts
//! the queue (waking every blocked poller) and releases the backing store.

use crate::config::Config;
use crate::frontier::FetchQueue;
use crate::merge::{DiscoveryEvent, FetchSignal, MergeEngine, MergeReport, UrlUpdate};
use crate::observer::CrawlObserver;
use crate::robots::RobotsPolicy;
use crate::state::{CrawlRecord, CrawlStatus};
use crate::store::{BackingStore, CrawlStateStore};
use crate::url::{PartitionId, Partitioner, UrlKey};
use crate::{CrawlDbError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where a partition worker is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Init,
    Open,
    Running,
    Closing,
    Closed,
}

impl WorkerState {
    /// Returns true if events may be added in this state
    pub fn accepts_events(&self) -> bool {
        matches!(self, Self::Open | Self::Running)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Open => "OPEN",
            Self::Running => "RUNNING",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// The two event streams a partition worker consumes
pub struct WorkerInputs {
    pub discoveries: mpsc::Receiver<DiscoveryEvent>,
    pub signals: mpsc::Receiver<FetchSignal>,
}

/// Final state of a partition, returned by [`PartitionWorker::close`]
#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub partition: PartitionId,

    /// Every record the partition held at close, ordered by key
    pub records: Vec<(UrlKey, CrawlRecord)>,

    pub status_counts: HashMap<CrawlStatus, usize>,

    /// Merges run, including the final one
    pub merges: u64,

    /// Counts summed over every merge
    pub totals: MergeReport,

    /// Events rejected because another partition owns their URL
    pub misrouted: u64,

    pub write_failures: u64,
}

impl PartitionReport {
    pub fn record(&self, key: &UrlKey) -> Option<&CrawlRecord> {
        self.records
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|i| &self.records[i].1)
    }

    pub fn count(&self, status: CrawlStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }
}

/// Owner of one partition's crawl state
pub struct PartitionWorker {
    partition: PartitionId,
    partitioner: Partitioner,
    state: WorkerState,
    backing: Option<Box<dyn BackingStore>>,
    store: Option<CrawlStateStore>,
    queue: Arc<FetchQueue>,
    engine: MergeEngine,
    merge_interval: Duration,
    buffer_threshold: usize,
    merges: u64,
    totals: MergeReport,
    misrouted: u64,
}

impl PartitionWorker {
    /// Creates a worker in `INIT` for `partition`
    ///
    /// Without a backing store (see [`with_backing_store`](Self::with_backing_store))
    /// the partition keeps its state in memory only.
    pub fn new(
        partition: PartitionId,
        config: &Config,
        queue: Arc<FetchQueue>,
        robots: Arc<dyn RobotsPolicy>,
        observer: Arc<dyn CrawlObserver>,
    ) -> Result<Self> {
        let partitioner = Partitioner::new(partition.count())?;
        Ok(Self {
            partition,
            partitioner,
            state: WorkerState::Init,
            backing: None,
            store: None,
            queue,
            engine: MergeEngine::new(partition, config.merge.clone(), robots, observer),
            merge_interval: config.merge.interval(),
            buffer_threshold: config.merge.buffer_threshold,
            merges: 0,
            totals: MergeReport::default(),
            misrouted: 0,
        })
    }

    pub fn with_backing_store(mut self, backing: Box<dyn BackingStore>) -> Self {
        self.backing = Some(backing);
        self
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn queue(&self) -> &Arc<FetchQueue> {
        &self.queue
    }

    /// The partition's store, once opened
    pub fn store(&self) -> Option<&CrawlStateStore> {
        self.store.as_ref()
    }

    /// Updates waiting for the next merge
    pub fn pending(&self) -> usize {
        self.engine.pending()
    }

    /// Loads the partition's state and starts accepting events
    ///
    /// # Errors
    ///
    /// Fails if the worker is not in `INIT`, or if the backing store cannot be
    /// read.
    pub fn open(&mut self) -> Result<()> {
        self.expect_state(WorkerState::Init)?;

        let store = match self.backing.take() {
            Some(backing) => CrawlStateStore::open(self.partition, backing)?,
            None => CrawlStateStore::in_memory(self.partition),
        };
        info!(
            "Partition {} open with {} records{}",
            self.partition,
            store.len(),
            if store.is_durable() { "" } else { " (in memory)" }
        );

        self.store = Some(store);
        self.state = WorkerState::Open;
        Ok(())
    }

    /// Buffers a discovered URL for the next merge
    pub fn on_discovery_event(&mut self, event: DiscoveryEvent) -> Result<()> {
        self.accept(&event.key)?;
        let (key, update): (UrlKey, UrlUpdate) = event.into();
        self.engine.add(key, update);
        Ok(())
    }

    /// Buffers a fetch start or completion for the next merge
    pub fn on_completion_event(&mut self, signal: FetchSignal) -> Result<()> {
        self.accept(signal.key())?;
        let (key, update): (UrlKey, UrlUpdate) = signal.into();
        self.engine.add(key, update);
        Ok(())
    }

    /// Returns true once enough updates are buffered to merge early
    pub fn merge_due(&self) -> bool {
        self.engine.pending() >= self.buffer_threshold
    }

    /// Merges everything buffered so far
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<MergeReport> {
        if !self.state.accepts_events() {
            return Err(CrawlDbError::InvalidWorkerState {
                expected: WorkerState::Running,
                actual: self.state,
            });
        }
        self.state = WorkerState::Running;
        self.merge(now).await
    }

    /// Consumes events until both streams end or `shutdown` fires, then closes
    ///
    /// Merges run every `merge.interval-ms`, and early whenever the buffer reaches
    /// `merge.buffer-threshold`. Misrouted events are logged and dropped.
    pub async fn run(
        mut self,
        inputs: WorkerInputs,
        shutdown: CancellationToken,
    ) -> Result<PartitionReport> {
        if self.state == WorkerState::Init {
            self.open()?;
        }

        let WorkerInputs {
            mut discoveries,
            mut signals,
        } = inputs;
        let mut discoveries_open = true;
        let mut signals_open = true;

        let mut interval = tokio::time::interval(self.merge_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while discoveries_open || signals_open {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick(Utc::now()).await?;
                }
                event = discoveries.recv(), if discoveries_open => match event {
                    Some(event) => self.handle(|w| w.on_discovery_event(event))?,
                    None => discoveries_open = false,
                },
                signal = signals.recv(), if signals_open => match signal {
                    Some(signal) => self.handle(|w| w.on_completion_event(signal))?,
                    None => signals_open = false,
                },
            }

            if self.merge_due() {
                self.tick(Utc::now()).await?;
            }
        }

        self.close().await
    }

    /// Stops accepting events, runs a final merge and releases the store
    pub async fn close(&mut self) -> Result<PartitionReport> {
        if !self.state.accepts_events() {
            return Err(CrawlDbError::InvalidWorkerState {
                expected: WorkerState::Running,
                actual: self.state,
            });
        }
        self.state = WorkerState::Closing;

        self.merge(Utc::now()).await?;
        self.queue.shutdown();

        let Some(store) = self.store.as_mut() else {
            return Err(CrawlDbError::InvalidWorkerState {
                expected: WorkerState::Open,
                actual: self.state,
            });
        };
        if let Err(e) = store.close() {
            warn!("Partition {} could not flush its store: {}", self.partition, e);
        }

        let mut records: Vec<(UrlKey, CrawlRecord)> = store
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));

        let report = PartitionReport {
            partition: self.partition,
            status_counts: store.status_counts(),
            write_failures: store.write_failures(),
            records,
            merges: self.merges,
            totals: self.totals.clone(),
            misrouted: self.misrouted,
        };

        self.state = WorkerState::Closed;
        info!(
            "Partition {} closed: {} records after {} merges ({} queued, {} write failures)",
            self.partition,
            report.records.len(),
            report.merges,
            report.totals.queued,
            report.write_failures
        );
        Ok(report)
    }

    async fn merge(&mut self, now: DateTime<Utc>) -> Result<MergeReport> {
        let store = self.store.as_mut().ok_or(CrawlDbError::InvalidWorkerState {
            expected: WorkerState::Open,
            actual: self.state,
        })?;

        let report = self.engine.merge(store, &self.queue, now).await;
        self.queue.gate().prune_idle();
        self.merges += 1;
        self.totals.accumulate(&report);
        Ok(report)
    }

    /// Applies an event, counting and dropping it if it was misrouted
    fn handle(&mut self, apply: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        match apply(self) {
            Err(CrawlDbError::MisroutedEvent { url, owner, .. }) => {
                self.misrouted += 1;
                warn!(
                    "Partition {} dropped {} (owned by partition {})",
                    self.partition, url, owner
                );
                Ok(())
            }
            other => other,
        }
    }

    fn accept(&self, key: &UrlKey) -> Result<()> {
        if !self.state.accepts_events() {
            return Err(CrawlDbError::InvalidWorkerState {
                expected: WorkerState::Running,
                actual: self.state,
            });
        }

        let owner = self.partitioner.partition_of(key);
        if owner != self.partition {
            return Err(CrawlDbError::MisroutedEvent {
                url: key.to_string(),
                owner: owner.index(),
                partition: self.partition.index(),
            });
        }
        Ok(())
    }

    fn expect_state(&self, expected: WorkerState) -> Result<()> {
        if self.state != expected {
            return Err(CrawlDbError::InvalidWorkerState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for PartitionWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionWorker")
            .field("partition", &self.partition)
            .field("state", &self.state)
            .field("pending", &self.engine.pending())
            .field("merges", &self.merges)
            .finish()
    }
}
