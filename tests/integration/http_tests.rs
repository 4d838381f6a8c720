//! Crawls against a live HTTP server

use crate::{fast_config, find};
use std::time::Duration;
use sumi_crawldb::{CrawlStatus, CrawlTopology};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_site() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    mount(
        &server,
        "/",
        html(r#"<a href="/a">A</a> <a href="/private/x">X</a> <a href="/redirect">R</a>"#),
    )
    .await;
    mount(&server, "/a", html(r#"<a href="/">home</a>"#)).await;
    mount(
        &server,
        "/redirect",
        ResponseTemplate::new(301).insert_header("location", format!("{}/b", base).as_str()),
    )
    .await;
    mount(&server, "/b", html("")).await;

    let reports = CrawlTopology::builder(fast_config(1))
        .seed(format!("{}/", base), 1.0)
        .build()
        .unwrap()
        .run_for(Duration::from_secs(2))
        .await
        .unwrap();

    let status = |p: &str| find(&reports, &format!("{}{}", base, p)).unwrap().status;
    assert_eq!(status("/"), CrawlStatus::Fetched);
    assert_eq!(status("/a"), CrawlStatus::Fetched);
    assert_eq!(status("/private/x"), CrawlStatus::RobotsDenied);
    assert_eq!(status("/redirect"), CrawlStatus::Redirected);
    assert_eq!(status("/b"), CrawlStatus::Fetched);
    assert_eq!(reports[0].records.len(), 5);
}

#[tokio::test]
async fn test_server_error_waits_for_retry() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let reports = CrawlTopology::builder(fast_config(1))
        .seed(format!("{}/", base), 1.0)
        .build()
        .unwrap()
        .run_for(Duration::from_millis(800))
        .await
        .unwrap();

    let record = find(&reports, &format!("{}/", base)).unwrap();
    assert_eq!(record.status, CrawlStatus::Error);
    assert_eq!(record.attempts, 1);
    assert!(record.next_fetch_time.is_some());
}

#[tokio::test]
async fn test_not_found_is_recorded() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount(&server, "/", html(r#"<a href="/gone">gone</a>"#)).await;
    mount(&server, "/gone", ResponseTemplate::new(404)).await;

    let reports = CrawlTopology::builder(fast_config(1))
        .seed(format!("{}/", base), 1.0)
        .build()
        .unwrap()
        .run_for(Duration::from_secs(1))
        .await
        .unwrap();

    let gone = find(&reports, &format!("{}/gone", base)).unwrap();
    assert_eq!(gone.status, CrawlStatus::Error);
    assert_eq!(gone.discovered_depth, 1);
}
