//! Crawl state definitions
//!
//! # Components
//!
//! - `CrawlStatus`: where a URL is in its fetch cycle
//! - `CrawlRecord`: the per-URL record kept by a partition's state store

mod record;
mod status;

pub use record::CrawlRecord;
pub use status::CrawlStatus;
