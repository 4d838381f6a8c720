//! Sumi-CrawlDB: partitioned crawl state and fetch scheduling
//!
//! This crate keeps the authoritative record of every URL a crawler knows about,
//! split into host-owned partitions so that no record is ever touched by two workers.
//! Each partition merges discovery and fetch events into its state store, keeps a
//! bounded priority queue of fetchable URLs, and throttles fetches per host.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod merge;
pub mod observer;
pub mod robots;
pub mod state;
pub mod store;
pub mod url;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Main error type for Sumi-CrawlDB operations
#[derive(Debug, Error)]
pub enum CrawlDbError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] store::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Partition {index} is outside the configured partition count {count}")]
    PartitionOutOfRange { index: u32, count: u32 },

    #[error("Event for {url} belongs to partition {owner}, not {partition}")]
    MisroutedEvent {
        url: String,
        owner: u32,
        partition: u32,
    },

    #[error("Partition worker is {actual}, expected {expected}")]
    InvalidWorkerState {
        expected: crawler::WorkerState,
        actual: crawler::WorkerState,
    },

    #[error("Event channel for partition {0} is closed")]
    ChannelClosed(u32),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-CrawlDB operations
pub type Result<T> = std::result::Result<T, CrawlDbError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Installs a `tracing` subscriber for the crate
///
/// Verbosity follows the usual convention: `0` logs crate info and warnings from
/// everything else, each extra level opens up one more level of detail. `quiet`
/// restricts output to errors. Calling this more than once is harmless, which keeps
/// it usable from tests.
pub fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_crawldb=info,warn"),
            1 => EnvFilter::new("sumi_crawldb=debug,info"),
            2 => EnvFilter::new("sumi_crawldb=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .try_init();
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlTopology, PartitionReport, PartitionWorker};
pub use frontier::{FetchQueue, OfferResult, PolitenessGate};
pub use merge::{MergeEngine, MergeReport};
pub use state::{CrawlRecord, CrawlStatus};
pub use store::CrawlStateStore;
pub use url::{normalize_url, PartitionId, Partitioner, UrlKey};
