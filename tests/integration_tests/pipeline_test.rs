//! Crawl to stream pipeline tests
//!
//! A query-tagged URL goes through frontier, fetch, extraction, index and
//! event bus, and ends up in a live search session for the same query.

use std::sync::Arc;
use std::time::Duration;

use resgrep::crawler::UrlOutcome;
use resgrep::models::Fingerprint;
use resgrep::publish::{DocumentIndex, PublishOutcome};
use resgrep::streaming::{MpscClient, ResultFilter, SearchSession, ServerMessage};
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{http_worker, DOCS_HTML, TUTORIAL_HTML};
use crate::common::TestBackends;

async fn serve_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

// ============================================================================
// Worker Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_fetched_page_is_indexed_and_links_follow_the_query() {
    let server = MockServer::start().await;
    serve_page(&server, "/python-tutorial", TUTORIAL_HTML).await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 0);
    let url = format!("{}/python-tutorial", server.uri());

    backends
        .frontier
        .enqueue_with_query(&url, Some("python"))
        .await
        .unwrap();
    backends
        .frontier
        .distribute(&["worker_1000".to_string()])
        .await
        .unwrap();

    let outcomes = worker.process_batch().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    let report = match &outcomes[0] {
        UrlOutcome::Published(report) => report.clone(),
        other => panic!("Expected published outcome, got {other:?}"),
    };
    assert_eq!(report.outcome, PublishOutcome::Created);
    assert_eq!(report.channels, vec!["results:all", "results:python"]);

    let stored = backends.index.get(&Fingerprint::of(&url)).await.unwrap();
    assert_eq!(stored.title, "Python Decorators Tutorial");
    assert_eq!(stored.code_snippets.len(), 1);

    // Only the same-host, relevant link is admitted; it carries the query
    let follow = format!("{}/python-guide", server.uri());
    assert_eq!(
        backends.store.list_snapshot("crawler:pending_urls").await,
        vec![follow.clone()]
    );
    assert_eq!(
        backends.frontier.origin_query(&follow).await.unwrap(),
        Some("python".to_string())
    );
}

#[tokio::test]
async fn test_worker_run_drains_its_queue() {
    let server = MockServer::start().await;
    serve_page(&server, "/python-tutorial", TUTORIAL_HTML).await;
    serve_page(&server, "/asyncio-docs", DOCS_HTML).await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 0);
    let urls = vec![
        format!("{}/python-tutorial", server.uri()),
        format!("{}/asyncio-docs", server.uri()),
    ];
    backends.frontier.enqueue_all(&urls, None).await.unwrap();
    backends
        .frontier
        .distribute(&["worker_1000".to_string()])
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(async move { worker.run(rx).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while backends.index.len().await < 2 {
        assert!(tokio::time::Instant::now() < deadline, "Worker did not publish in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tx.send(true).unwrap();
    let summary = task.await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_revisit_is_skipped_without_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/python-tutorial"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TUTORIAL_HTML))
        .expect(1)
        .mount(&server)
        .await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 0);
    let url = format!("{}/python-tutorial", server.uri());

    assert!(matches!(
        worker.process_url(&url).await.unwrap(),
        UrlOutcome::Published(_)
    ));
    assert!(matches!(
        worker.process_url(&url).await.unwrap(),
        UrlOutcome::Skipped(_)
    ));
    assert_eq!(backends.index.len().await, 1);
}

// ============================================================================
// End-to-End Streaming Tests
// ============================================================================

#[tokio::test]
async fn test_crawled_resource_reaches_open_search_session() {
    let server = MockServer::start().await;
    serve_page(&server, "/python-tutorial", TUTORIAL_HTML).await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 0);
    let url = format!("{}/python-tutorial", server.uri());

    let session = SearchSession::new(
        "python",
        ResultFilter::empty(),
        backends.index.clone(),
        backends.bus.clone(),
        &backends.channels,
    )
    .with_keepalive(Duration::from_secs(60));
    let (mut client, mut handle) = MpscClient::pair();
    let task = tokio::spawn(async move { session.run(&mut client).await });

    // Empty index: stats, then the completion status
    assert!(matches!(
        handle.next_message().await,
        Some(ServerMessage::Stats { total: 0, .. })
    ));
    assert!(matches!(
        handle.next_message().await,
        Some(ServerMessage::Status { .. })
    ));

    backends
        .frontier
        .enqueue_with_query(&url, Some("python"))
        .await
        .unwrap();
    backends
        .frontier
        .distribute(&["worker_1000".to_string()])
        .await
        .unwrap();
    worker.process_batch().await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), handle.next_message())
        .await
        .expect("Live result not delivered");
    match message {
        Some(ServerMessage::Result { data }) => {
            assert_eq!(data.url, url);
            assert_eq!(data.source.as_str(), "realtime");
            assert_eq!(data.score, Some(2.0));
        }
        other => panic!("Expected result message, got {other:?}"),
    }

    handle.close();
    let summary = task.await.unwrap();
    assert_eq!(summary.delivered, 1);
}

#[tokio::test]
async fn test_indexed_resource_is_found_by_later_session() {
    let server = MockServer::start().await;
    serve_page(&server, "/asyncio-docs", DOCS_HTML).await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 0);
    let url = format!("{}/asyncio-docs", server.uri());
    worker.process_url(&url).await.unwrap();

    let index: Arc<dyn DocumentIndex> = backends.index.clone();
    let session = SearchSession::new(
        "asyncio",
        ResultFilter::empty(),
        index,
        backends.bus.clone(),
        &backends.channels,
    );
    let (mut client, mut handle) = MpscClient::pair();
    let task = tokio::spawn(async move { session.run(&mut client).await });

    assert!(matches!(
        handle.next_message().await,
        Some(ServerMessage::Stats { total: 1, .. })
    ));
    match handle.next_message().await {
        Some(ServerMessage::Result { data }) => {
            assert_eq!(data.url, url);
            assert_eq!(data.source.as_str(), "index");
        }
        other => panic!("Expected result message, got {other:?}"),
    }

    handle.close();
    task.await.unwrap();
}
