//! Integration tests for Sumi-CrawlDB
//!
//! Whole crawls run through `CrawlTopology` against in-memory web graphs and
//! wiremock servers, plus the crawl-state properties checked through the public API.

mod http_tests;
mod properties_tests;
mod recovery_tests;
mod topology_tests;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_crawldb::crawler::{FetchError, FetchOutcome, Fetcher, PartitionReport};
use sumi_crawldb::{Config, CrawlRecord, UrlKey};
use url::Url;

/// A configuration that merges often and never waits between fetches
pub fn fast_config(partitions: u32) -> Config {
    sumi_crawldb::init_logging(0, true);

    let mut config = Config::default();
    config.partitions.count = partitions;
    config.politeness.min_interval_ms = 0;
    config.merge.interval_ms = 10;
    config
}

/// Looks a URL up across every partition's report
pub fn find<'a>(reports: &'a [PartitionReport], url: &str) -> Option<&'a CrawlRecord> {
    let key = UrlKey::parse(url).ok()?;
    reports.iter().find_map(|r| r.record(&key))
}

pub fn total_records(reports: &[PartitionReport]) -> usize {
    reports.iter().map(|r| r.records.len()).sum()
}

/// Wraps a fetcher, counting fetches and the most simultaneous fetches per host
pub struct CountingFetcher {
    inner: Arc<dyn Fetcher>,
    delay: Duration,
    fetches: AtomicUsize,
    hosts: Mutex<HashMap<String, (usize, usize)>>,
}

impl CountingFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            fetches: AtomicUsize::new(0),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches to one host that were ever in flight together
    pub fn max_concurrent(&self, host: &str) -> usize {
        self.hosts
            .lock()
            .unwrap()
            .get(host)
            .map_or(0, |(_, max)| *max)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
        let host = url.host_str().unwrap_or_default().to_string();
        self.fetches.fetch_add(1, Ordering::SeqCst);
        {
            let mut hosts = self.hosts.lock().unwrap();
            let (current, max) = hosts.entry(host.clone()).or_default();
            *current += 1;
            *max = (*max).max(*current);
        }

        tokio::time::sleep(self.delay).await;
        let result = self.inner.fetch(url).await;

        if let Some((current, _)) = self.hosts.lock().unwrap().get_mut(&host) {
            *current -= 1;
        }
        result
    }
}
