use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-CrawlDB
///
/// Every section, and every key inside a section, has a default, so an empty file
/// is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub partitions: PartitionsConfig,
    pub queue: QueueConfig,
    pub politeness: PolitenessConfig,
    pub merge: MergeConfig,
    pub fetch: FetchConfig,
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
}

/// Partitioning of the URL space
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PartitionsConfig {
    /// Number of partitions, each with its own worker, store and queue
    pub count: u32,
}

impl Default for PartitionsConfig {
    fn default() -> Self {
        Self { count: 4 }
    }
}

/// Per-partition fetch queue
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct QueueConfig {
    /// Maximum number of URLs waiting to be fetched
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Per-host throttling
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PolitenessConfig {
    /// Minimum time between two fetches from the same host (milliseconds)
    pub min_interval_ms: u64,

    /// Maximum number of simultaneous fetches from the same host
    pub max_concurrent_per_host: u32,

    /// How long a host is left alone after answering 429 (milliseconds)
    pub rate_limit_backoff_ms: u64,
}

impl PolitenessConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            max_concurrent_per_host: 1,
            rate_limit_backoff_ms: 30_000,
        }
    }
}

/// Merge scheduling and crawl-state policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MergeConfig {
    /// Time between two periodic merges (milliseconds)
    pub interval_ms: u64,

    /// Buffered updates that trigger a merge before the interval elapses
    pub buffer_threshold: usize,

    /// Transient failures tolerated before a URL is skipped for good
    pub max_attempts: u32,

    /// Age after which an unanswered fetch is treated as failed (seconds)
    pub fetch_timeout_secs: u64,

    /// Delay before a transiently failed URL is retried (seconds)
    pub retry_delay_secs: u64,

    /// Delay before a fetched URL becomes eligible again (seconds)
    pub recrawl_interval_secs: u64,

    /// URLs discovered deeper than this are recorded but never queued
    pub max_depth: u32,

    /// Score given to newly discovered URLs
    pub default_score: f64,
}

impl MergeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fetch_timeout(&self) -> chrono::Duration {
        secs(self.fetch_timeout_secs)
    }

    pub fn retry_delay(&self) -> chrono::Duration {
        secs(self.retry_delay_secs)
    }

    pub fn recrawl_interval(&self) -> chrono::Duration {
        secs(self.recrawl_interval_secs)
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            buffer_threshold: 256,
            max_attempts: 3,
            fetch_timeout_secs: 120,
            retry_delay_secs: 60,
            recrawl_interval_secs: 86_400,
            max_depth: 10,
            default_score: 1.0,
        }
    }
}

/// Fetch workers and outbound URL filtering
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// Fetch workers polling each partition's queue
    pub workers_per_partition: usize,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Redirect hops followed before giving up
    pub max_redirects: usize,

    /// Discovered URLs longer than this are dropped
    pub max_url_length: usize,

    /// Host patterns that are never crawled (e.g., "*.example.com")
    pub exclude_domains: Vec<String>,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers_per_partition: 2,
            timeout_secs: 30,
            max_redirects: 10,
            max_url_length: 2048,
            exclude_domains: Vec::new(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    ///
    /// Format: `{name}/{version} (+{url}; {email})`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiCrawlDb".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// Durable state and event plumbing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// SQLite database mirroring the crawl state; in-memory only when absent
    pub database_path: Option<String>,

    /// Capacity of each partition's inbound event channels
    pub channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            channel_capacity: 1024,
        }
    }
}

fn secs(value: u64) -> chrono::Duration {
    let value = i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    chrono::Duration::seconds(value)
}
