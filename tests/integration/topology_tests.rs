//! Whole crawls over in-memory web graphs

use crate::{fast_config, find, total_records, CountingFetcher};
use std::sync::Arc;
use std::time::Duration;
use sumi_crawldb::crawler::{CrawlTopology, SimpleWebGraph, WebGraphFetcher};
use sumi_crawldb::robots::ALLOW_ALL;
use sumi_crawldb::{CrawlStatus, Partitioner, UrlKey};

fn two_domain_graph() -> SimpleWebGraph {
    SimpleWebGraph::new()
        .add("domain1.com", &["domain1.com/page1", "domain1.com/page2"])
        .unwrap()
        .add("domain1.com/page1", &[])
        .unwrap()
        .add(
            "domain1.com/page2",
            &["domain2.com", "domain1.com", "domain1.com/page1"],
        )
        .unwrap()
        .add("domain2.com", &["domain2.com/page1"])
        .unwrap()
}

#[tokio::test]
async fn test_crawl_two_domains() {
    let reports = CrawlTopology::builder(fast_config(4))
        .seed("http://domain1.com", 1.0)
        .fetcher(Arc::new(WebGraphFetcher::new(Arc::new(two_domain_graph()))))
        .robots(Arc::new(ALLOW_ALL))
        .build()
        .unwrap()
        .run_for(Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(reports.len(), 4);
    assert_eq!(total_records(&reports), 5);

    for url in [
        "http://domain1.com/",
        "http://domain1.com/page1",
        "http://domain1.com/page2",
        "http://domain2.com/",
    ] {
        assert_eq!(find(&reports, url).unwrap().status, CrawlStatus::Fetched, "{}", url);
    }

    // Linked but missing from the graph: 404
    let missing = find(&reports, "http://domain2.com/page1").unwrap();
    assert_eq!(missing.status, CrawlStatus::Error);
    assert_eq!(missing.discovered_depth, 3);

    assert_eq!(find(&reports, "http://domain1.com/page1").unwrap().discovered_depth, 1);
}

#[tokio::test]
async fn test_records_live_in_owning_partition() {
    let reports = CrawlTopology::builder(fast_config(3))
        .seed("http://domain1.com", 1.0)
        .fetcher(Arc::new(WebGraphFetcher::new(Arc::new(two_domain_graph()))))
        .robots(Arc::new(ALLOW_ALL))
        .build()
        .unwrap()
        .run_for(Duration::from_millis(800))
        .await
        .unwrap();

    let partitioner = Partitioner::new(3).unwrap();
    for report in &reports {
        assert_eq!(report.misrouted, 0);
        for (key, _) in &report.records {
            assert_eq!(partitioner.partition_of(key), report.partition);
        }
    }
}

#[tokio::test]
async fn test_each_page_fetched_once() {
    let counting = Arc::new(CountingFetcher::new(
        Arc::new(WebGraphFetcher::new(Arc::new(two_domain_graph()))),
        Duration::ZERO,
    ));

    CrawlTopology::builder(fast_config(2))
        .seed("http://domain1.com", 1.0)
        .seed("http://www.domain1.com/", 1.0)
        .fetcher(counting.clone())
        .robots(Arc::new(ALLOW_ALL))
        .build()
        .unwrap()
        .run_for(Duration::from_secs(1))
        .await
        .unwrap();

    // Four pages plus the missing one; rediscoveries and the duplicate seed add nothing
    assert_eq!(counting.fetches(), 5);
}

#[tokio::test]
async fn test_one_fetch_per_host_at_a_time() {
    let children: Vec<String> = (0..8).map(|i| format!("busy.com/p{}", i)).collect();
    let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();
    let mut graph = SimpleWebGraph::new().add("busy.com", &child_refs).unwrap();
    for child in &child_refs {
        graph = graph.add(child, &[]).unwrap();
    }

    let counting = Arc::new(CountingFetcher::new(
        Arc::new(WebGraphFetcher::new(Arc::new(graph))),
        Duration::from_millis(20),
    ));

    let mut config = fast_config(1);
    config.fetch.workers_per_partition = 4;
    config.politeness.max_concurrent_per_host = 1;

    let reports = CrawlTopology::builder(config)
        .seed("http://busy.com", 1.0)
        .fetcher(counting.clone())
        .robots(Arc::new(ALLOW_ALL))
        .build()
        .unwrap()
        .run_for(Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(counting.max_concurrent("busy.com"), 1);
    assert_eq!(reports[0].count(CrawlStatus::Fetched), 9);
}

#[tokio::test]
async fn test_depth_limit_stops_crawl() {
    let graph = SimpleWebGraph::new()
        .add("deep.com", &["deep.com/1"])
        .unwrap()
        .add("deep.com/1", &["deep.com/2"])
        .unwrap()
        .add("deep.com/2", &["deep.com/3"])
        .unwrap()
        .add("deep.com/3", &[])
        .unwrap();

    let mut config = fast_config(1);
    config.merge.max_depth = 1;

    let reports = CrawlTopology::builder(config)
        .seed("http://deep.com", 1.0)
        .fetcher(Arc::new(WebGraphFetcher::new(Arc::new(graph))))
        .robots(Arc::new(ALLOW_ALL))
        .build()
        .unwrap()
        .run_for(Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(find(&reports, "http://deep.com/1").unwrap().status, CrawlStatus::Fetched);
    let beyond = find(&reports, "http://deep.com/2").unwrap();
    assert_eq!(beyond.status, CrawlStatus::Unfetched);
    assert_eq!(beyond.discovered_depth, 2);
    assert!(find(&reports, "http://deep.com/3").is_none());
}

#[tokio::test]
async fn test_graph_scores_links() {
    let graph = Arc::new(
        SimpleWebGraph::new()
            .add("hub.com", &["hub.com/hot", "hub.com/cold"])
            .unwrap()
            .with_score("hub.com/hot", 9.0)
            .unwrap(),
    );

    let reports = CrawlTopology::builder(fast_config(1))
        .seed("http://hub.com", 1.0)
        .fetcher(Arc::new(WebGraphFetcher::new(graph.clone())))
        .scorer(graph)
        .robots(Arc::new(ALLOW_ALL))
        .build()
        .unwrap()
        .run_for(Duration::from_millis(500))
        .await
        .unwrap();

    let key = UrlKey::parse("http://hub.com/hot").unwrap();
    assert_eq!(reports[0].record(&key).unwrap().score, 9.0);
    assert_eq!(find(&reports, "http://hub.com/cold").unwrap().score, 1.0);
}
