//! In-process crawl runtime
//!
//! [`CrawlTopology`] wires every partition of a crawl inside one process: a
//! [`PartitionWorker`] task per partition, `fetch.workers-per-partition` fetch
//! worker tasks on each partition's queue, and a [`Router`] sending every discovery
//! to the partition that owns its host. Partitions share nothing but the router.

use crate::config::{validate, Config};
use crate::crawler::fetch_worker::{FetchServices, FetchWorker, FixedScore, LinkScorer};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::parser::{HtmlLinkParser, LinkParser};
use crate::crawler::router::Router;
use crate::crawler::worker::{PartitionReport, PartitionWorker, WorkerInputs};
use crate::frontier::{FetchQueue, PolitenessGate};
use crate::merge::DiscoveryEvent;
use crate::observer::{CrawlObserver, TracingObserver};
use crate::robots::{RobotsPolicy, RobotsTxtPolicy};
use crate::store::{BackingStore, SqliteBackingStore, StorageResult};
use crate::url::{
    PartitionId, Partitioner, StandardNormalizer, StandardUrlFilter, UrlFilter, UrlNormalizer,
};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Opens the backing store of a partition
pub type StoreFactory =
    Arc<dyn Fn(PartitionId) -> StorageResult<Box<dyn BackingStore>> + Send + Sync>;

/// Builder for [`CrawlTopology`]
///
/// Every collaborator has a default taken from the configuration:
///
/// | Collaborator | Default |
/// |--------------|---------|
/// | fetcher | [`HttpFetcher`] |
/// | parser | [`HtmlLinkParser`] |
/// | robots | [`RobotsTxtPolicy`] |
/// | normalizer | [`StandardNormalizer`] |
/// | filter | [`StandardUrlFilter`] from `[fetch]` |
/// | scorer | [`FixedScore`] of `merge.default-score` |
/// | observer | [`TracingObserver`] |
/// | backing stores | SQLite at `storage.database-path`, or none |
pub struct CrawlTopologyBuilder {
    config: Config,
    seeds: Vec<(String, f64)>,
    fetcher: Option<Arc<dyn Fetcher>>,
    parser: Option<Arc<dyn LinkParser>>,
    robots: Option<Arc<dyn RobotsPolicy>>,
    normalizer: Option<Arc<dyn UrlNormalizer>>,
    filter: Option<Arc<dyn UrlFilter>>,
    scorer: Option<Arc<dyn LinkScorer>>,
    observer: Option<Arc<dyn CrawlObserver>>,
    stores: Option<StoreFactory>,
}

impl CrawlTopologyBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            seeds: Vec::new(),
            fetcher: None,
            parser: None,
            robots: None,
            normalizer: None,
            filter: None,
            scorer: None,
            observer: None,
            stores: None,
        }
    }

    /// Adds a seed URL, discovered at depth 0 with `score`
    pub fn seed(mut self, url: impl Into<String>, score: f64) -> Self {
        self.seeds.push((url.into(), score));
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn LinkParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn UrlNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn UrlFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn LinkScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Uses `factory` to open each partition's backing store
    pub fn backing_stores(mut self, factory: StoreFactory) -> Self {
        self.stores = Some(factory);
        self
    }

    /// Validates the configuration and fills in default collaborators
    pub fn build(self) -> Result<CrawlTopology> {
        validate(&self.config)?;
        let config = self.config;
        let partitioner = Partitioner::new(config.partitions.count)?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::from_config(&config)?),
        };
        let robots: Arc<dyn RobotsPolicy> = match self.robots {
            Some(robots) => robots,
            None => Arc::new(RobotsTxtPolicy::from_config(&config)?),
        };
        let filter: Arc<dyn UrlFilter> = match self.filter {
            Some(filter) => filter,
            None => Arc::new(StandardUrlFilter::from_config(&config.fetch)?),
        };

        let stores = self.stores.or_else(|| {
            config.storage.database_path.as_ref().map(|path| {
                let path = PathBuf::from(path);
                let factory: StoreFactory = Arc::new(
                    move |partition: PartitionId| -> StorageResult<Box<dyn BackingStore>> {
                        Ok(Box::new(SqliteBackingStore::open(&path, partition)?))
                    },
                );
                factory
            })
        });

        let services = FetchServices {
            fetcher,
            parser: self.parser.unwrap_or_else(|| Arc::new(HtmlLinkParser)),
            normalizer: self
                .normalizer
                .unwrap_or_else(|| Arc::new(StandardNormalizer)),
            filter,
            scorer: self
                .scorer
                .unwrap_or_else(|| Arc::new(FixedScore(config.merge.default_score))),
            rate_limit_backoff: config.politeness.rate_limit_backoff(),
        };

        Ok(CrawlTopology {
            partitioner,
            seeds: self.seeds,
            services,
            robots,
            observer: self
                .observer
                .unwrap_or_else(|| Arc::new(TracingObserver)),
            stores,
            config,
        })
    }
}

/// A crawl ready to run in this process
pub struct CrawlTopology {
    config: Config,
    partitioner: Partitioner,
    seeds: Vec<(String, f64)>,
    services: FetchServices,
    robots: Arc<dyn RobotsPolicy>,
    observer: Arc<dyn CrawlObserver>,
    stores: Option<StoreFactory>,
}

impl CrawlTopology {
    pub fn builder(config: Config) -> CrawlTopologyBuilder {
        CrawlTopologyBuilder::new(config)
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    /// Crawls for `duration`, then closes every partition
    ///
    /// Returns one report per partition, in partition order.
    ///
    /// # Errors
    ///
    /// Fails before anything runs if a partition's backing store cannot be opened,
    /// and afterwards if a partition worker failed.
    pub async fn run_for(self, duration: Duration) -> Result<Vec<PartitionReport>> {
        let capacity = self.config.storage.channel_capacity;

        // Open every partition first, so a bad store stops the crawl before it starts
        let mut workers = Vec::with_capacity(self.partitioner.count() as usize);
        for partition in self.partitioner.partitions() {
            let gate = Arc::new(PolitenessGate::from_config(&self.config.politeness));
            let queue = Arc::new(FetchQueue::new(self.config.queue.capacity, gate));

            let mut worker = PartitionWorker::new(
                partition,
                &self.config,
                queue,
                Arc::clone(&self.robots),
                Arc::clone(&self.observer),
            )?;
            if let Some(stores) = &self.stores {
                worker = worker.with_backing_store(stores(partition)?);
            }
            worker.open()?;
            workers.push(worker);
        }

        let mut discovery_txs = Vec::with_capacity(workers.len());
        let mut channels = Vec::with_capacity(workers.len());
        for _ in &workers {
            let (discovery_tx, discoveries) = mpsc::channel(capacity);
            let (signal_tx, signals) = mpsc::channel(capacity);
            discovery_txs.push(discovery_tx);
            channels.push((
                WorkerInputs {
                    discoveries,
                    signals,
                },
                signal_tx,
            ));
        }
        let router = Router::new(self.partitioner, discovery_txs)?;

        let shutdown = CancellationToken::new();
        let mut partition_tasks: Vec<JoinHandle<Result<PartitionReport>>> = Vec::new();
        let mut fetch_tasks: Vec<JoinHandle<Result<()>>> = Vec::new();

        for (worker, (inputs, signal_tx)) in workers.into_iter().zip(channels) {
            let partition = worker.partition();
            let queue = Arc::clone(worker.queue());

            for id in 0..self.config.fetch.workers_per_partition {
                let fetch_worker = FetchWorker::new(
                    partition,
                    id,
                    Arc::clone(&queue),
                    self.services.clone(),
                    router.clone(),
                    signal_tx.clone(),
                );
                fetch_tasks.push(tokio::spawn(fetch_worker.run(shutdown.child_token())));
            }
            partition_tasks.push(tokio::spawn(worker.run(inputs, shutdown.child_token())));
        }

        info!(
            "Crawl started: {} partitions, {} fetch workers, {} seeds",
            partition_tasks.len(),
            fetch_tasks.len(),
            self.seeds.len()
        );

        if let Err(e) = self.inject_seeds(&router).await {
            shutdown.cancel();
            return Err(e);
        }

        tokio::time::sleep(duration).await;
        shutdown.cancel();

        for task in fetch_tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Fetch worker failed: {}", e),
                Err(e) => warn!("Fetch worker panicked: {}", e),
            }
        }

        let mut reports = Vec::with_capacity(partition_tasks.len());
        for task in partition_tasks {
            reports.push(task.await.map_err(std::io::Error::from)??);
        }

        info!(
            "Crawl finished: {} records across {} partitions",
            reports.iter().map(|r| r.records.len()).sum::<usize>(),
            reports.len()
        );
        Ok(reports)
    }

    async fn inject_seeds(&self, router: &Router) -> Result<()> {
        for (raw, score) in &self.seeds {
            let key = match self.services.normalizer.normalize(raw) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping seed {}: {}", raw, e);
                    continue;
                }
            };
            if !self.services.filter.accept(&key) {
                warn!("Skipping seed {}: excluded by the URL filter", raw);
                continue;
            }

            router
                .route(DiscoveryEvent {
                    key,
                    score: *score,
                    depth: 0,
                })
                .await?;
        }
        Ok(())
    }
}
