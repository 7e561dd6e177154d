//! Error scenario integration tests
//!
//! Tests failure modes of the crawl path:
//! 1. HTTP error responses (404, 500)
//! 2. Transient failures recovered by retry
//! 3. Connection failures
//! 4. Pages that are not resources, and broken markup
//! 5. Search backend failures during a session

use std::time::Duration;

use resgrep::config::WorkerConfig;
use resgrep::crawler::{Crawler, PageFetcher, SkipReason, UrlOutcome};
use resgrep::error::{ErrorCategory, ResgrepErrorTrait};
use resgrep::models::Fingerprint;
use resgrep::publish::EventBus;
use resgrep::streaming::{MpscClient, ResultFilter, SearchSession, ServerMessage};
use resgrep::utils::retry::RetryConfig;
use resgrep::Error;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{http_worker, MALFORMED_HTML, PLAIN_PAGE_HTML, TUTORIAL_HTML};
use crate::common::{create_event, TestBackends};

fn fast_crawler(retries: u32) -> Crawler {
    let config = WorkerConfig {
        rate_limit: 50.0,
        ..WorkerConfig::default()
    };
    Crawler::new(&config, Duration::from_millis(500))
        .unwrap()
        .with_retry(RetryConfig::with_delays(retries, 10, 50))
}

// ============================================================================
// HTTP Error Tests
// ============================================================================

#[tokio::test]
async fn test_not_found_is_a_failed_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 2);
    let url = format!("{}/missing-tutorial", server.uri());

    let outcome = worker.process_url(&url).await.unwrap();
    assert!(matches!(outcome, UrlOutcome::Failed(_)));

    // Failed fetches are still marked visited so they are not retried forever
    assert!(backends
        .frontier
        .dedup()
        .is_visited(&Fingerprint::of(&url))
        .await
        .unwrap());
    assert!(backends.index.is_empty().await);
    assert!(backends.bus.published().is_empty());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let crawler = fast_crawler(3);
    let err = crawler
        .fetch_page(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::FetchStatus { status: 404, .. }));
    assert!(!err.is_recoverable());
    assert_eq!(err.category(), ErrorCategory::Fetch);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky-tutorial"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky-tutorial"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TUTORIAL_HTML))
        .mount(&server)
        .await;

    let page = fast_crawler(2)
        .fetch_page(&format!("{}/flaky-tutorial", server.uri()))
        .await
        .unwrap();
    assert_eq!(page.status, 200);
    assert!(page.body.contains("Python Decorators Tutorial"));
}

#[tokio::test]
async fn test_persistent_server_error_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = fast_crawler(2)
        .fetch_page(&format!("{}/down", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FetchStatus { status: 503, .. }));
}

// ============================================================================
// Network Error Tests
// ============================================================================

#[tokio::test]
async fn test_connection_refused() {
    let result = fast_crawler(0).fetch_page("http://127.0.0.1:1/tutorial").await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert_eq!(err.category(), ErrorCategory::Fetch);
}

#[tokio::test]
async fn test_timeout_handling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(TUTORIAL_HTML)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let result = fast_crawler(0)
        .fetch_page(&format!("{}/slow", server.uri()))
        .await;
    assert!(matches!(result, Err(Error::Http(_))));
}

// ============================================================================
// Content Tests
// ============================================================================

#[tokio::test]
async fn test_non_resource_page_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PLAIN_PAGE_HTML))
        .mount(&server)
        .await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 0);

    let outcome = worker
        .process_url(&format!("{}/picnic", server.uri()))
        .await
        .unwrap();
    assert_eq!(outcome, UrlOutcome::Skipped(SkipReason::Extraction));
    assert!(backends.index.is_empty().await);
}

#[tokio::test]
async fn test_malformed_html_does_not_break_the_worker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MALFORMED_HTML))
        .mount(&server)
        .await;

    let backends = TestBackends::new();
    let worker = http_worker(&backends, &["127.0.0.1"], 0);

    let outcome = worker
        .process_url(&format!("{}/tips", server.uri()))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        UrlOutcome::Published(_) | UrlOutcome::Skipped(SkipReason::Extraction)
    ));
}

// ============================================================================
// Search Backend Failures
// ============================================================================

#[tokio::test]
async fn test_bulk_search_failure_keeps_session_open() {
    let backends = TestBackends::new();
    backends.index.fail_searches("connection refused").await;
    let channel = backends.channels.query_channel("python");

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

    match handle.next_message().await {
        Some(ServerMessage::Error { message }) => {
            assert!(message.starts_with("Search error: "), "unexpected: {message}")
        }
        other => panic!("Expected search error, got {other:?}"),
    }

    backends
        .bus
        .publish(&channel, &create_event("https://realpython.com/python-lists/", "Python Lists"))
        .await
        .unwrap();

    match handle.next_message().await {
        Some(ServerMessage::Result { data }) => {
            assert_eq!(data.url, "https://realpython.com/python-lists/")
        }
        other => panic!("Expected live result, got {other:?}"),
    }

    handle.close();
    let summary = task.await.unwrap();
    assert_eq!(summary.bulk_total, None);
}
