use crate::config::PolitenessConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Tracks the fetch activity of one host
#[derive(Debug, Clone, Default)]
struct HostState {
    /// Fetches currently holding a permit
    in_flight: u32,

    /// When the last permit was granted
    last_acquired: Option<Instant>,

    /// Set after the host answered 429
    blocked_until: Option<Instant>,

    /// Permits granted over the gate's lifetime
    request_count: u64,
}

impl HostState {
    /// Checks if a fetch can start now
    ///
    /// This method enforces:
    /// - Rate-limit penalties (HTTP 429)
    /// - Maximum simultaneous fetches per host
    /// - Minimum time between fetch starts
    fn can_acquire(&self, min_interval: Duration, max_concurrent: u32, now: Instant) -> bool {
        if self.blocked_until.is_some_and(|until| now < until) {
            return false;
        }

        if self.in_flight >= max_concurrent {
            return false;
        }

        match self.last_acquired {
            Some(last) => now.duration_since(last) >= min_interval,
            None => true,
        }
    }

    /// Returns true when forgetting the host would not loosen any restriction
    fn is_idle(&self, min_interval: Duration, now: Instant) -> bool {
        self.in_flight == 0
            && self.blocked_until.map_or(true, |until| now >= until)
            && self
                .last_acquired
                .map_or(true, |last| now.duration_since(last) >= min_interval)
    }

    /// Time left before the timed restrictions lift
    ///
    /// Returns None while the host is at its concurrency limit, since only a
    /// release can change that.
    fn time_until_ready(
        &self,
        min_interval: Duration,
        max_concurrent: u32,
        now: Instant,
    ) -> Option<Duration> {
        if self.in_flight >= max_concurrent {
            return None;
        }

        let blocked = self
            .blocked_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();
        let interval = self
            .last_acquired
            .map(|last| min_interval.saturating_sub(now.duration_since(last)))
            .unwrap_or_default();

        Some(blocked.max(interval))
    }
}

/// Per-host fetch throttle
///
/// Shared by every fetch worker of a partition. Since a host belongs to exactly
/// one partition, the gate's view of a host is complete.
#[derive(Debug)]
pub struct PolitenessGate {
    min_interval: Duration,
    max_concurrent: u32,
    hosts: Mutex<HashMap<String, HostState>>,
    released: Notify,
}

impl PolitenessGate {
    pub fn new(min_interval: Duration, max_concurrent_per_host: u32) -> Self {
        Self {
            min_interval,
            max_concurrent: max_concurrent_per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
            released: Notify::new(),
        }
    }

    pub fn from_config(config: &PolitenessConfig) -> Self {
        Self::new(config.min_interval(), config.max_concurrent_per_host)
    }

    /// Tries to start a fetch from `host`
    ///
    /// # Returns
    ///
    /// * `true` - The host had a free slot and its interval had passed
    /// * `false` - The host is busy, penalized, or was fetched too recently
    ///
    /// Every successful call must be paired with [`release`](Self::release).
    /// [`acquire`](Self::acquire) does the pairing automatically.
    pub fn try_acquire(&self, host: &str) -> bool {
        self.try_acquire_at(host, Instant::now())
    }

    /// Like [`try_acquire`](Self::try_acquire), at a given instant
    pub fn try_acquire_at(&self, host: &str, now: Instant) -> bool {
        let mut hosts = self.lock();
        let state = hosts.entry(host.to_string()).or_default();

        let granted = state.can_acquire(self.min_interval, self.max_concurrent, now);
        trace!(
            "Politeness check for {}: granted={} in_flight={}",
            host,
            granted,
            state.in_flight
        );

        if granted {
            state.in_flight += 1;
            state.last_acquired = Some(now);
            state.request_count += 1;
        }
        granted
    }

    /// Tries to start a fetch, returning a permit that releases the host on drop
    pub fn acquire(self: &Arc<Self>, host: &str) -> Option<HostPermit> {
        self.acquire_at(host, Instant::now())
    }

    pub(crate) fn acquire_at(self: &Arc<Self>, host: &str, now: Instant) -> Option<HostPermit> {
        self.try_acquire_at(host, now).then(|| HostPermit {
            gate: Arc::clone(self),
            host: host.to_string(),
        })
    }

    /// Ends a fetch started with `try_acquire` and wakes waiting pollers
    ///
    /// A host left idle by the release is forgotten.
    pub fn release(&self, host: &str) {
        {
            let now = Instant::now();
            let mut hosts = self.lock();
            if let Some(state) = hosts.get_mut(host) {
                state.in_flight = state.in_flight.saturating_sub(1);
                if state.is_idle(self.min_interval, now) {
                    hosts.remove(host);
                }
            }
        }
        self.released.notify_waiters();
    }

    /// Forgets every idle host, returning how many were dropped
    ///
    /// Hosts still inside their interval when their last permit was released are
    /// only reclaimed here.
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(Instant::now())
    }

    pub(crate) fn prune_idle_at(&self, now: Instant) -> usize {
        let mut hosts = self.lock();
        let before = hosts.len();
        hosts.retain(|_, state| !state.is_idle(self.min_interval, now));
        let pruned = before - hosts.len();
        if pruned > 0 {
            trace!("Pruned {} idle hosts, {} tracked", pruned, hosts.len());
        }
        pruned
    }

    /// Hosts the gate currently keeps state for
    pub fn tracked_hosts(&self) -> usize {
        self.lock().len()
    }

    /// Keeps a host closed for `duration`, e.g. after it answered 429
    pub fn penalize(&self, host: &str, duration: Duration) {
        let until = Instant::now() + duration;
        {
            let mut hosts = self.lock();
            let state = hosts.entry(host.to_string()).or_default();
            state.blocked_until = Some(state.blocked_until.map_or(until, |b| b.max(until)));
        }
        debug!("Host {} penalized for {:?}", host, duration);
    }

    /// Time until `host` can be acquired
    ///
    /// Returns `Some(Duration::ZERO)` when it can be acquired now, and None when
    /// the host is at its concurrency limit and only a release will free it.
    pub fn time_until_ready(&self, host: &str) -> Option<Duration> {
        self.time_until_ready_at(host, Instant::now())
    }

    pub(crate) fn time_until_ready_at(&self, host: &str, now: Instant) -> Option<Duration> {
        match self.lock().get(host) {
            Some(state) => state.time_until_ready(self.min_interval, self.max_concurrent, now),
            None => Some(Duration::ZERO),
        }
    }

    /// Fetches from `host` currently holding a permit
    pub fn in_flight(&self, host: &str) -> u32 {
        self.lock().get(host).map_or(0, |s| s.in_flight)
    }

    /// Permits granted for `host` since it was last idle
    pub fn request_count(&self, host: &str) -> u64 {
        self.lock().get(host).map_or(0, |s| s.request_count)
    }

    pub(crate) fn released(&self) -> &Notify {
        &self.released
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HostState>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An acquired host slot
///
/// Dropping the permit releases the host, whether the fetch succeeded, failed or
/// unwound.
#[derive(Debug)]
pub struct HostPermit {
    gate: Arc<PolitenessGate>,
    host: String,
}

impl HostPermit {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for HostPermit {
    fn drop(&mut self) {
        self.gate.release(&self.host);
    }
}
