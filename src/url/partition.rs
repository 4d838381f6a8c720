//! Host-based partitioning
//!
//! Every URL is owned by exactly one partition, chosen from its host alone. All the
//! pages of a site therefore land in the same partition, which is what lets the
//! politeness gate and the crawl state store run without cross-partition locking.

use crate::url::{normalize_url, UrlKey};
use crate::url::extract_host;
use crate::{ConfigError, CrawlDbError};
use sha2::{Digest, Sha256};
use std::fmt;

/// Partition used for URLs whose host cannot be determined
pub const FALLBACK_PARTITION: u32 = 0;

/// Identity of one partition: its index and the total partition count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId {
    index: u32,
    count: u32,
}

impl PartitionId {
    /// Creates a partition identity, rejecting an index outside the count
    pub fn new(index: u32, count: u32) -> Result<Self, CrawlDbError> {
        if index >= count {
            return Err(CrawlDbError::PartitionOutOfRange { index, count });
        }
        Ok(Self { index, count })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

/// Maps hosts to partitions
///
/// The mapping is a SHA-256 of the normalized host, so it does not depend on the
/// process, the platform or the Rust version, and durable state written by one run
/// reattaches to the same partition in the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    count: u32,
}

impl Partitioner {
    /// Creates a partitioner for `count` partitions
    pub fn new(count: u32) -> Result<Self, ConfigError> {
        if count == 0 {
            return Err(ConfigError::Validation(
                "partition count must be >= 1".to_string(),
            ));
        }
        Ok(Self { count })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the partition that owns a URL key
    ///
    /// # Arguments
    ///
    /// * `key` - A normalized URL key; only its host is used
    ///
    /// # Returns
    ///
    /// The owning partition, the same for every URL of the host and across restarts
    pub fn partition_of(&self, key: &UrlKey) -> PartitionId {
        self.partition_for_host(key.host())
    }

    /// Returns the partition that owns a host
    pub fn partition_for_host(&self, host: &str) -> PartitionId {
        PartitionId {
            index: host_bucket(host, self.count),
            count: self.count,
        }
    }

    /// Returns the partition for a raw URL string
    ///
    /// URLs that cannot be parsed, or have no host, go to [`FALLBACK_PARTITION`].
    pub fn partition_of_raw(&self, raw: &str) -> PartitionId {
        match normalize_url(raw).ok().as_ref().and_then(extract_host) {
            Some(host) => self.partition_for_host(&host),
            None => PartitionId {
                index: FALLBACK_PARTITION,
                count: self.count,
            },
        }
    }

    /// Returns all partition identities, in index order
    pub fn partitions(&self) -> impl Iterator<Item = PartitionId> + '_ {
        (0..self.count).map(move |index| PartitionId {
            index,
            count: self.count,
        })
    }
}

fn host_bucket(host: &str, count: u32) -> u32 {
    let digest = Sha256::digest(host.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(count)) as u32
}
