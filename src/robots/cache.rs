//! Robots.txt caching
//!
//! Entries expire after a fixed age (24 hours by default) so changes made by
//! site owners are picked up.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Default lifetime of a cached robots.txt
pub const DEFAULT_ROBOTS_TTL_HOURS: i64 = 24;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Robots.txt entries keyed by origin (`scheme://host[:port]`)
#[derive(Debug)]
pub struct RobotsCache {
    entries: HashMap<String, CachedRobots>,
    ttl: Duration,
}

impl RobotsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Returns the fresh entry for `origin`, if any
    pub fn get(&self, origin: &str) -> Option<&ParsedRobots> {
        self.entries
            .get(origin)
            .filter(|cached| !cached.is_stale(self.ttl))
            .map(|cached| &cached.content)
    }

    pub fn insert(&mut self, origin: String, robots: ParsedRobots) {
        self.entries.insert(origin, CachedRobots::new(robots));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_ROBOTS_TTL_HOURS))
    }
}
