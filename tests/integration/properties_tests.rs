//! Crawl-state guarantees checked through the public API

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use sumi_crawldb::config::MergeConfig;
use sumi_crawldb::frontier::{OfferResult, QueuedUrl, RejectReason};
use sumi_crawldb::merge::{collapse, resolve, CompletionStatus, UrlUpdate};
use sumi_crawldb::observer::NoopObserver;
use sumi_crawldb::robots::ALLOW_ALL;
use sumi_crawldb::{
    CrawlRecord, CrawlStateStore, CrawlStatus, FetchQueue, MergeEngine, PartitionId, Partitioner,
    PolitenessGate, UrlKey,
};

fn key(url: &str) -> UrlKey {
    UrlKey::parse(url).unwrap()
}

fn engine() -> MergeEngine {
    MergeEngine::new(
        PartitionId::new(0, 1).unwrap(),
        MergeConfig::default(),
        Arc::new(ALLOW_ALL),
        Arc::new(NoopObserver),
    )
}

fn open_queue(capacity: usize) -> FetchQueue {
    FetchQueue::new(capacity, Arc::new(PolitenessGate::new(Duration::ZERO, 1)))
}

fn queued(url: &str, score: f64) -> QueuedUrl {
    QueuedUrl {
        key: key(url),
        score,
        depth: 0,
    }
}

#[tokio::test]
async fn test_rediscovery_keeps_one_record() {
    let mut engine = engine();
    let mut store = CrawlStateStore::in_memory(PartitionId::new(0, 1).unwrap());
    let queue = open_queue(10);

    for url in ["http://a.com/x", "http://WWW.a.com/x/", "http://a.com/x#frag"] {
        engine.add(key(url), UrlUpdate::Discovered { score: 1.0, depth: 2 });
    }
    engine.merge(&mut store, &queue, Utc::now()).await;

    engine.add(key("http://a.com/x"), UrlUpdate::Discovered { score: 4.0, depth: 1 });
    engine.merge(&mut store, &queue, Utc::now()).await;

    assert_eq!(store.len(), 1);
    let record = store.get(&key("http://a.com/x")).unwrap();
    assert_eq!(record.score, 4.0);
    assert_eq!(record.discovered_depth, 1);
    assert_eq!(queue.size(), 1);
}

#[test]
fn test_fetch_outcome_survives_rediscovery_in_same_batch() {
    let now = Utc::now();
    let config = MergeConfig::default();
    let mut fetching = CrawlRecord::discovered(1.0, 0);
    fetching.status = CrawlStatus::Fetching;
    fetching.fetch_started_at = Some(now - ChronoDuration::seconds(1));

    let collapsed = collapse(vec![
        (
            key("http://a.com/"),
            UrlUpdate::Completed {
                status: CompletionStatus::Fetched,
                at: now,
            },
        ),
        (
            key("http://a.com/"),
            UrlUpdate::Discovered { score: 2.0, depth: 0 },
        ),
    ]);
    let update = &collapsed[&key("http://a.com/")];

    let resolution = resolve(Some(&fetching), update, &config, now).unwrap();
    assert_eq!(resolution.previous, Some(CrawlStatus::Fetching));
    assert_eq!(resolution.record.status, CrawlStatus::Fetched);
    assert_eq!(resolution.record.score, 2.0);
    assert!(resolution.record.next_fetch_time.unwrap() > now);
}

#[test]
fn test_arrival_order_does_not_change_outcome() {
    let now = Utc::now();
    let updates = vec![
        (key("http://a.com/"), UrlUpdate::Started { at: now }),
        (
            key("http://a.com/"),
            UrlUpdate::Completed {
                status: CompletionStatus::TransientError("timeout".into()),
                at: now,
            },
        ),
        (
            key("http://a.com/"),
            UrlUpdate::Completed {
                status: CompletionStatus::Fetched,
                at: now,
            },
        ),
        (key("http://a.com/"), UrlUpdate::Discovered { score: 3.0, depth: 1 }),
    ];
    let mut reversed = updates.clone();
    reversed.reverse();

    assert_eq!(collapse(updates), collapse(reversed));
}

#[test]
fn test_partition_assignment_is_stable() {
    let urls = [
        "http://example.com/",
        "https://blog.example.org/post?id=7",
        "http://news.site.test/a/b/c",
        "http://shop.test/cart",
    ];

    for count in 1..=8 {
        let partitioner = Partitioner::new(count).unwrap();
        let again = Partitioner::new(count).unwrap();
        for url in urls {
            let owner = partitioner.partition_of(&key(url));
            assert!(owner.index() < count);
            assert_eq!(owner, again.partition_of(&key(url)));
        }
    }

    // Every URL of a host has the same owner
    let partitioner = Partitioner::new(5).unwrap();
    assert_eq!(
        partitioner.partition_of(&key("http://www.example.com/")),
        partitioner.partition_of(&key("https://example.com/deep/page?q=1")),
    );
}

#[test]
fn test_queue_holds_only_best_scores() {
    let queue = open_queue(2);

    assert!(queue.offer(queued("http://a.com/1", 1.0)).is_accepted());
    assert!(queue.offer(queued("http://a.com/2", 2.0)).is_accepted());

    assert_eq!(
        queue.offer(queued("http://a.com/0", 0.5)),
        OfferResult::Rejected(RejectReason::Full)
    );
    assert_eq!(
        queue.offer(queued("http://a.com/eq", 1.0)),
        OfferResult::Rejected(RejectReason::Full)
    );

    match queue.offer(queued("http://a.com/3", 3.0)) {
        OfferResult::Accepted { evicted: Some(lost) } => assert_eq!(lost.key, key("http://a.com/1")),
        other => panic!("expected eviction, got {:?}", other),
    }
    assert_eq!(queue.size(), 2);
    assert_eq!(
        queue.offer(queued("http://a.com/2", 9.0)),
        OfferResult::Rejected(RejectReason::Duplicate)
    );
}

#[tokio::test]
async fn test_host_waits_between_fetches() {
    let gate = Arc::new(PolitenessGate::new(Duration::from_millis(200), 1));
    let queue = FetchQueue::new(10, gate.clone());
    queue.offer(queued("http://slow.com/1", 2.0));
    queue.offer(queued("http://slow.com/2", 1.0));
    queue.offer(queued("http://other.com/", 0.5));

    let first = queue.try_poll().unwrap();
    assert_eq!(first.url.key, key("http://slow.com/1"));
    drop(first.permit);
    assert_eq!(gate.in_flight("slow.com"), 0);

    // slow.com is in its interval, so the other host goes first
    let second = queue.try_poll().unwrap();
    assert_eq!(second.url.key, key("http://other.com/"));

    let early = tokio::time::timeout(Duration::from_millis(50), queue.poll()).await;
    assert!(early.is_err());

    let third = tokio::time::timeout(Duration::from_secs(2), queue.poll())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.url.key, key("http://slow.com/2"));
}

#[tokio::test]
async fn test_fetching_url_never_requeued() {
    let mut engine = engine();
    let mut store = CrawlStateStore::in_memory(PartitionId::new(0, 1).unwrap());
    let queue = open_queue(10);
    let url = key("http://a.com/page");

    engine.add(url.clone(), UrlUpdate::Discovered { score: 1.0, depth: 0 });
    engine.merge(&mut store, &queue, Utc::now()).await;
    assert!(queue.contains(&url));
    assert_eq!(store.get(&url).unwrap().status, CrawlStatus::Queued);

    let polled = queue.try_poll().unwrap();
    assert!(!queue.contains(&url));
    engine.add(url.clone(), UrlUpdate::Started { at: Utc::now() });
    engine.add(url.clone(), UrlUpdate::Discovered { score: 5.0, depth: 0 });
    engine.merge(&mut store, &queue, Utc::now()).await;

    assert_eq!(store.get(&url).unwrap().status, CrawlStatus::Fetching);
    assert!(!queue.contains(&url));
    drop(polled);
}
