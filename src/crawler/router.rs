use crate::merge::DiscoveryEvent;
use crate::url::{PartitionId, Partitioner};
use crate::{CrawlDbError, Result};
use tokio::sync::mpsc;
use tracing::trace;

/// Sends each discovery event to the partition that owns its host
#[derive(Clone)]
pub struct Router {
    partitioner: Partitioner,
    senders: Vec<mpsc::Sender<DiscoveryEvent>>,
}

impl Router {
    /// Creates a router; `senders[i]` feeds partition `i`
    pub fn new(partitioner: Partitioner, senders: Vec<mpsc::Sender<DiscoveryEvent>>) -> Result<Self> {
        if senders.len() != partitioner.count() as usize {
            return Err(CrawlDbError::PartitionOutOfRange {
                index: senders.len() as u32,
                count: partitioner.count(),
            });
        }
        Ok(Self {
            partitioner,
            senders,
        })
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// Waits for room in the owner's channel, then sends
    pub async fn route(&self, event: DiscoveryEvent) -> Result<PartitionId> {
        let owner = self.partitioner.partition_of(&event.key);
        let index = owner.index();
        trace!("Routing {} to partition {}", event.key, owner);

        self.senders[index as usize]
            .send(event)
            .await
            .map_err(|_| CrawlDbError::ChannelClosed(index))?;
        Ok(owner)
    }
}
