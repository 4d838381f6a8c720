//! Bounded fetch queue
//!
//! This module handles:
//! - Score-ordered storage of URLs waiting to be fetched
//! - Admission under a fixed capacity, evicting the lowest score when full
//! - Polling that skips hosts the politeness gate is holding back
//! - Waking pollers on new entries, host releases and shutdown

use crate::frontier::politeness::{HostPermit, PolitenessGate};
use crate::url::UrlKey;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedUrl {
    pub key: UrlKey,

    /// Priority value (higher is fetched first)
    pub score: f64,

    /// Hops from the nearest seed
    pub depth: u32,
}

/// Why an offer was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// At capacity, and the URL does not outscore the lowest entry
    Full,

    /// The key is already queued
    Duplicate,

    /// The queue has been shut down
    Closed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Outcome of [`FetchQueue::offer`]
#[derive(Debug, Clone, PartialEq)]
pub enum OfferResult {
    /// Queued; `evicted` is the entry that lost its slot, if any
    Accepted { evicted: Option<QueuedUrl> },
    Rejected(RejectReason),
}

impl OfferResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// A URL handed to a fetch worker, with its host slot
///
/// The host stays acquired until `permit` is dropped.
#[derive(Debug)]
pub struct PolledUrl {
    pub url: QueuedUrl,
    pub permit: HostPermit,
}

/// Queue entry, ordered by score then by URL
///
/// The greatest entry has the highest score and, among equal scores, the
/// smallest URL, so ties always resolve the same way.
#[derive(Debug, Clone)]
struct Entry(QueuedUrl);

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.key.cmp(&self.0.key))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

#[derive(Debug, Default)]
struct QueueState {
    entries: BTreeSet<Entry>,
    members: HashSet<UrlKey>,
}

/// What a single polling pass found
enum Attempt {
    Taken(PolledUrl),
    Closed,
    /// Nothing available; retry after the duration, or on the next wake-up if None
    Wait(Option<Duration>),
}

/// Bounded max-priority queue feeding one partition's fetch workers
///
/// The partition's merge is the only producer; fetch workers are the consumers.
/// A key is never in the queue twice.
#[derive(Debug)]
pub struct FetchQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    gate: Arc<PolitenessGate>,
    changed: Notify,
    shutdown: CancellationToken,
}

impl FetchQueue {
    pub fn new(capacity: usize, gate: Arc<PolitenessGate>) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            gate,
            changed: Notify::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Offers a URL for fetching
    ///
    /// When the queue is full, the URL only gets in if its score is strictly
    /// greater than the lowest queued score; that lowest entry is then evicted
    /// and returned so the caller can put it back to `Unfetched`.
    ///
    /// # Returns
    ///
    /// * `Accepted { evicted }` - Queued, with the entry that lost its slot if any
    /// * `Rejected(reason)` - Not queued: full, duplicate, or shut down
    pub fn offer(&self, url: QueuedUrl) -> OfferResult {
        if self.shutdown.is_cancelled() {
            return OfferResult::Rejected(RejectReason::Closed);
        }

        let evicted = {
            let mut state = self.lock();

            if state.members.contains(&url.key) {
                return OfferResult::Rejected(RejectReason::Duplicate);
            }

            let mut evicted = None;
            if state.entries.len() >= self.capacity {
                let outscores_lowest = state
                    .entries
                    .first()
                    .is_some_and(|lowest| url.score.total_cmp(&lowest.0.score) == Ordering::Greater);
                if !outscores_lowest {
                    return OfferResult::Rejected(RejectReason::Full);
                }

                if let Some(Entry(lowest)) = state.entries.pop_first() {
                    state.members.remove(&lowest.key);
                    debug!("Evicted {} (score {}) for {}", lowest.key, lowest.score, url.key);
                    evicted = Some(lowest);
                }
            }

            state.members.insert(url.key.clone());
            state.entries.insert(Entry(url));
            evicted
        };

        self.changed.notify_waiters();
        OfferResult::Accepted { evicted }
    }

    /// Takes the best URL whose host can be fetched now, waiting if there is none
    ///
    /// Entries on throttled hosts are skipped, not waited on, so one slow host
    /// never holds up the rest of the queue. Returns None once the queue is shut
    /// down.
    pub async fn poll(&self) -> Option<PolledUrl> {
        loop {
            let queue_changed = self.changed.notified();
            let host_released = self.gate.released().notified();
            tokio::pin!(queue_changed, host_released);
            // Register before looking, so a wake-up between the look and the
            // wait is not lost
            queue_changed.as_mut().enable();
            host_released.as_mut().enable();

            let wait = match self.attempt() {
                Attempt::Taken(polled) => return Some(polled),
                Attempt::Closed => return None,
                Attempt::Wait(wait) => wait,
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = &mut queue_changed => {}
                _ = &mut host_released => {}
                _ = sleep_for(wait) => {}
            }
        }
    }

    /// Non-blocking [`poll`](Self::poll)
    pub fn try_poll(&self) -> Option<PolledUrl> {
        match self.attempt() {
            Attempt::Taken(polled) => Some(polled),
            _ => None,
        }
    }

    fn attempt(&self) -> Attempt {
        if self.shutdown.is_cancelled() {
            return Attempt::Closed;
        }

        let now = Instant::now();
        let mut state = self.lock();
        let mut soonest: Option<Duration> = None;

        let taken = {
            let mut throttled: HashSet<&str> = HashSet::new();
            let mut taken = None;

            for entry in state.entries.iter().rev() {
                let host = entry.0.key.host();
                if throttled.contains(host) {
                    continue;
                }

                if let Some(permit) = self.gate.acquire_at(host, now) {
                    taken = Some((entry.clone(), permit));
                    break;
                }

                if let Some(wait) = self.gate.time_until_ready_at(host, now) {
                    soonest = Some(soonest.map_or(wait, |s| s.min(wait)));
                }
                trace!("Skipping throttled host {}", host);
                throttled.insert(host);
            }
            taken
        };

        match taken {
            Some((entry, permit)) => {
                state.entries.remove(&entry);
                state.members.remove(&entry.0.key);
                Attempt::Taken(PolledUrl {
                    url: entry.0,
                    permit,
                })
            }
            None => Attempt::Wait(soonest),
        }
    }

    /// Closes the queue and wakes every waiting poller
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.changed.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, key: &UrlKey) -> bool {
        self.lock().members.contains(key)
    }

    /// Withdraws a queued URL before any worker polls it
    pub fn remove(&self, key: &UrlKey) -> Option<QueuedUrl> {
        let mut state = self.lock();
        if !state.members.remove(key) {
            return None;
        }

        let entry = state.entries.iter().find(|entry| entry.0.key == *key).cloned()?;
        state.entries.remove(&entry);
        Some(entry.0)
    }

    /// Returns the queued URLs, best first
    pub fn snapshot(&self) -> Vec<QueuedUrl> {
        self.lock()
            .entries
            .iter()
            .rev()
            .map(|entry| entry.0.clone())
            .collect()
    }

    pub fn gate(&self) -> &Arc<PolitenessGate> {
        &self.gate
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        // Never zero: the host was busy a moment ago, give the clock a tick
        Some(duration) => tokio::time::sleep(duration.max(Duration::from_millis(1))).await,
        None => std::future::pending::<()>().await,
    }
}
