//! Crawls that resume from a SQLite database

use crate::{fast_config, find, total_records, CountingFetcher};
use std::sync::Arc;
use std::time::Duration;
use sumi_crawldb::crawler::{CrawlTopology, SimpleWebGraph, WebGraphFetcher};
use sumi_crawldb::robots::ALLOW_ALL;
use sumi_crawldb::store::{BackingStore, SqliteBackingStore};
use sumi_crawldb::{Config, CrawlStatus, PartitionId, Partitioner};
use tempfile::TempDir;

fn site() -> Arc<SimpleWebGraph> {
    Arc::new(
        SimpleWebGraph::new()
            .add("alpha.test", &["alpha.test/1", "beta.test", "gamma.test"])
            .unwrap()
            .add("alpha.test/1", &["delta.test"])
            .unwrap()
            .add("beta.test", &["alpha.test"])
            .unwrap()
            .add("gamma.test", &[])
            .unwrap()
            .add("delta.test", &["epsilon.test"])
            .unwrap()
            .add("epsilon.test", &[])
            .unwrap(),
    )
}

fn persistent_config(dir: &TempDir, partitions: u32) -> Config {
    let mut config = fast_config(partitions);
    config.storage.database_path = Some(dir.path().join("crawl.db").to_string_lossy().into_owned());
    config
}

async fn crawl(config: Config, fetcher: Arc<CountingFetcher>) -> Vec<sumi_crawldb::PartitionReport> {
    CrawlTopology::builder(config)
        .seed("http://alpha.test", 1.0)
        .fetcher(fetcher)
        .robots(Arc::new(ALLOW_ALL))
        .build()
        .unwrap()
        .run_for(Duration::from_millis(800))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_restart_does_not_refetch() {
    let dir = TempDir::new().unwrap();

    let first = Arc::new(CountingFetcher::new(
        Arc::new(WebGraphFetcher::new(site())),
        Duration::ZERO,
    ));
    let reports = crawl(persistent_config(&dir, 2), first.clone()).await;
    assert_eq!(first.fetches(), 6);
    assert_eq!(total_records(&reports), 6);

    let second = Arc::new(CountingFetcher::new(
        Arc::new(WebGraphFetcher::new(site())),
        Duration::ZERO,
    ));
    let reports = crawl(persistent_config(&dir, 2), second.clone()).await;

    assert_eq!(second.fetches(), 0);
    assert_eq!(total_records(&reports), 6);
    assert_eq!(
        find(&reports, "http://epsilon.test/").unwrap().status,
        CrawlStatus::Fetched
    );
}

#[tokio::test]
async fn test_restart_with_more_partitions() {
    let dir = TempDir::new().unwrap();

    let fetcher = Arc::new(CountingFetcher::new(
        Arc::new(WebGraphFetcher::new(site())),
        Duration::ZERO,
    ));
    crawl(persistent_config(&dir, 2), fetcher).await;

    let fetcher = Arc::new(CountingFetcher::new(
        Arc::new(WebGraphFetcher::new(site())),
        Duration::ZERO,
    ));
    let reports = crawl(persistent_config(&dir, 3), fetcher.clone()).await;

    assert_eq!(fetcher.fetches(), 0);
    assert_eq!(reports.len(), 3);
    assert_eq!(total_records(&reports), 6);

    let partitioner = Partitioner::new(3).unwrap();
    for report in &reports {
        for (key, record) in &report.records {
            assert_eq!(partitioner.partition_of(key), report.partition);
            assert_eq!(record.status, CrawlStatus::Fetched);
        }
    }
}

#[tokio::test]
async fn test_database_rows_split_by_owner() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(
        Arc::new(WebGraphFetcher::new(site())),
        Duration::ZERO,
    ));
    crawl(persistent_config(&dir, 1), fetcher).await;

    let path = dir.path().join("crawl.db");
    let mut loaded = 0;
    for index in 0..4 {
        let partition = PartitionId::new(index, 4).unwrap();
        let mut store = SqliteBackingStore::open(&path, partition).unwrap();
        assert_eq!(store.count_rows().unwrap(), 6);
        loaded += store.load_all().unwrap().len();
    }
    assert_eq!(loaded, 6);
}
