//! Event merging
//!
//! Discovery events and fetch signals are buffered per partition and applied to
//! the partition's store in batches. Each merge also refills the fetch queue.

mod engine;
mod event;
mod resolve;

pub use engine::{MergeEngine, MergeReport};
pub use event::{CompletionEvent, CompletionStatus, DiscoveryEvent, FetchSignal, UrlUpdate};
pub use resolve::{apply_completion, collapse, resolve, CollapsedUpdate, Resolution};
