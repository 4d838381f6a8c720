//! URL handling
//!
//! This module provides URL normalization, host extraction, host pattern matching,
//! the [`UrlKey`] identity every crawl record is stored under, and the host-based
//! [`Partitioner`].

mod domain;
mod matcher;
mod normalize;
mod partition;

use crate::config::FetchConfig;
use crate::{ConfigResult, UrlError, UrlResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

pub use domain::extract_host;
pub use matcher::HostPattern;
pub use normalize::normalize_url;
pub use partition::{PartitionId, Partitioner, FALLBACK_PARTITION};

/// A normalized URL and its host
///
/// Two keys are equal exactly when their normalized URLs are equal. The host is
/// derived from the URL and carried along so partitioning and politeness never have
/// to re-parse it.
#[derive(Debug, Clone)]
pub struct UrlKey {
    url: Url,
    host: String,
}

impl UrlKey {
    /// Normalizes a raw URL string into a key
    pub fn parse(raw: &str) -> UrlResult<Self> {
        Self::from_url(normalize_url(raw)?)
    }

    /// Builds a key from a URL that has already been normalized
    pub(crate) fn from_url(url: Url) -> UrlResult<Self> {
        let host = extract_host(&url).ok_or(UrlError::MissingDomain)?;
        Ok(Self { url, host })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl PartialEq for UrlKey {
    fn eq(&self, other: &Self) -> bool {
        self.url.as_str() == other.url.as_str()
    }
}

impl Eq for UrlKey {}

impl Hash for UrlKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.as_str().hash(state);
    }
}

impl PartialOrd for UrlKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UrlKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.url.as_str().cmp(other.url.as_str())
    }
}

impl fmt::Display for UrlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Turns raw URL strings into crawl keys
pub trait UrlNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> UrlResult<UrlKey>;
}

/// The normalizer behind [`UrlKey::parse`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNormalizer;

impl UrlNormalizer for StandardNormalizer {
    fn normalize(&self, raw: &str) -> UrlResult<UrlKey> {
        UrlKey::parse(raw)
    }
}

/// Decides whether a normalized URL may enter the crawl at all
pub trait UrlFilter: Send + Sync {
    fn accept(&self, key: &UrlKey) -> bool;
}

/// Rejects over-long URLs and URLs on excluded hosts
#[derive(Debug, Clone)]
pub struct StandardUrlFilter {
    max_length: usize,
    excluded: Vec<HostPattern>,
}

impl StandardUrlFilter {
    pub fn new(max_length: usize, excluded: Vec<HostPattern>) -> Self {
        Self {
            max_length,
            excluded,
        }
    }

    /// Builds the filter from the `[fetch]` configuration section
    pub fn from_config(config: &FetchConfig) -> ConfigResult<Self> {
        let excluded = config
            .exclude_domains
            .iter()
            .map(|pattern| HostPattern::parse(pattern))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self::new(config.max_url_length, excluded))
    }
}

impl UrlFilter for StandardUrlFilter {
    fn accept(&self, key: &UrlKey) -> bool {
        key.as_str().len() <= self.max_length
            && !self.excluded.iter().any(|p| p.matches(key.host()))
    }
}
