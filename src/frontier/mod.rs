//! Fetch frontier
//!
//! The per-partition fetch queue and the per-host politeness gate it consults
//! before handing a URL to a fetch worker.

mod politeness;
mod queue;

pub use politeness::{HostPermit, PolitenessGate};
pub use queue::{FetchQueue, OfferResult, PolledUrl, QueuedUrl, RejectReason};
