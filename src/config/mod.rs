//! Configuration module for Sumi-CrawlDB
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_crawldb::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawldb.toml")).unwrap();
//! println!("Queue capacity per partition: {}", config.queue.capacity);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, FetchConfig, MergeConfig, PartitionsConfig, PolitenessConfig, QueueConfig,
    StorageConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
