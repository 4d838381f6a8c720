//! Crawl runtime
//!
//! This module turns the partitioned crawl state into a running crawl:
//! - Partition workers owning each partition's state and merge schedule
//! - Fetch workers polling the queues and reporting outcomes
//! - The fetcher, link parser and web graph collaborators they call
//! - The in-process topology wiring it all together

mod fetch_worker;
mod fetcher;
mod parser;
mod router;
mod topology;
mod webgraph;
mod worker;

pub use fetch_worker::{FetchServices, FetchWorker, FixedScore, LinkScorer};
pub use fetcher::{build_http_client, FetchError, FetchOutcome, Fetcher, HttpFetcher};
pub use parser::{HtmlLinkParser, LinkParser};
pub use router::Router;
pub use topology::{CrawlTopology, CrawlTopologyBuilder, StoreFactory};
pub use webgraph::{EmptyGraph, SimpleWebGraph, WebGraph, WebGraphFetcher, EMPTY_GRAPH};
pub use worker::{PartitionReport, PartitionWorker, WorkerInputs, WorkerState};
