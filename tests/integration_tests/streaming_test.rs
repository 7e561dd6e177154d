//! Streaming search tests
//!
//! Sessions are driven through the in-process client channel; the HTTP API
//! is exercised through the router without binding a socket.

use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use resgrep::config::StreamingConfig;
use resgrep::crawler::CrawlTrigger;
use resgrep::models::ResourceType;
use resgrep::streaming::{
    AppState, MpscClient, MpscClientHandle, ResultFilter, SearchSession, ServerMessage,
    SessionManager, SessionSummary, StreamServer,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use crate::common::{create_test_document, create_typed_document, TestBackends};

fn open_session(
    backends: &TestBackends,
    query: &str,
    filter: ResultFilter,
) -> (MpscClientHandle, JoinHandle<SessionSummary>) {
    let session = SearchSession::new(
        query,
        filter,
        backends.index.clone(),
        backends.bus.clone(),
        &backends.channels,
    )
    .with_keepalive(Duration::from_secs(60));
    let (mut client, handle) = MpscClient::pair();
    let task = tokio::spawn(async move { session.run(&mut client).await });
    (handle, task)
}

/// Collect result URLs until the bulk completion status
async fn drain_bulk(handle: &mut MpscClientHandle) -> Vec<String> {
    let mut urls = Vec::new();
    loop {
        match handle.next_message().await {
            Some(ServerMessage::Result { data }) => urls.push(data.url),
            Some(ServerMessage::Stats { .. }) => {}
            Some(ServerMessage::Status { .. }) => return urls,
            other => panic!("Unexpected message during bulk phase: {other:?}"),
        }
    }
}

async fn next_result_url(handle: &mut MpscClientHandle) -> String {
    let message = tokio::time::timeout(Duration::from_secs(2), handle.next_message())
        .await
        .expect("No message in time");
    match message {
        Some(ServerMessage::Result { data }) => data.url,
        other => panic!("Expected result, got {other:?}"),
    }
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_bulk_and_live_copy_delivered_once() {
    let backends = TestBackends::new();
    let pipeline = backends.pipeline();
    let indexed = create_test_document("https://realpython.com/python-basics/", "Python Basics");
    pipeline.publish(&indexed, Some("python")).await.unwrap();

    let (mut handle, task) = open_session(&backends, "python", ResultFilter::empty());
    assert_eq!(drain_bulk(&mut handle).await, vec![indexed.url.clone()]);

    // Re-crawl of the same page announces it again; a new page follows
    pipeline.publish(&indexed, Some("python")).await.unwrap();
    let fresh = create_test_document("https://dev.to/t/python/asyncio", "Python asyncio");
    pipeline.publish(&fresh, Some("python")).await.unwrap();

    assert_eq!(next_result_url(&mut handle).await, fresh.url);

    handle.close();
    let summary = task.await.unwrap();
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.bulk_total, Some(1));
}

#[tokio::test]
async fn test_filter_applies_to_bulk_and_live() {
    let backends = TestBackends::new();
    let pipeline = backends.pipeline();
    let article = create_test_document("https://dev.to/python-news", "Python news");
    let tutorial = create_typed_document(
        "https://realpython.com/python-classes/",
        "Python classes",
        ResourceType::Tutorial,
    );
    pipeline.publish(&article, None).await.unwrap();
    pipeline.publish(&tutorial, None).await.unwrap();

    let filter = ResultFilter::empty().with("type", "tutorial");
    let (mut handle, task) = open_session(&backends, "python", filter);
    assert_eq!(drain_bulk(&mut handle).await, vec![tutorial.url.clone()]);

    let live_article = create_test_document("https://dev.to/python-release", "Python release");
    let live_tutorial = create_typed_document(
        "https://realpython.com/python-sets/",
        "Python sets",
        ResourceType::Tutorial,
    );
    pipeline.publish(&live_article, Some("python")).await.unwrap();
    pipeline.publish(&live_tutorial, Some("python")).await.unwrap();

    assert_eq!(next_result_url(&mut handle).await, live_tutorial.url);

    handle.close();
    let summary = task.await.unwrap();
    assert_eq!(summary.delivered, 2);
    // The bulk article is excluded by the index query itself
    assert_eq!(summary.filtered, 1);
}

#[tokio::test]
async fn test_sessions_only_hear_their_own_query() {
    let backends = TestBackends::new();
    let pipeline = backends.pipeline();

    let (mut rust_handle, rust_task) = open_session(&backends, "Rust", ResultFilter::empty());
    let (mut python_handle, python_task) = open_session(&backends, "python", ResultFilter::empty());
    drain_bulk(&mut rust_handle).await;
    drain_bulk(&mut python_handle).await;

    let python_doc = create_test_document("https://realpython.com/python-dicts/", "Python dicts");
    let rust_doc = create_test_document("https://doc.rust-lang.org/book/", "The Rust book");
    pipeline.publish(&python_doc, Some("python")).await.unwrap();
    // Query channels are case and whitespace insensitive
    pipeline.publish(&rust_doc, Some("  rust ")).await.unwrap();

    assert_eq!(next_result_url(&mut python_handle).await, python_doc.url);
    assert_eq!(next_result_url(&mut rust_handle).await, rust_doc.url);

    rust_handle.close();
    python_handle.close();
    assert_eq!(rust_task.await.unwrap().delivered, 1);
    assert_eq!(python_task.await.unwrap().delivered, 1);
}

#[tokio::test]
async fn test_live_results_flow_while_bulk_is_slow_and_close_cancels_it() {
    let backends = TestBackends::new();
    backends.index.delay_searches(Duration::from_secs(30)).await;
    let pipeline = backends.pipeline();
    let channel = backends.channels.query_channel("python");

    let (mut handle, task) = open_session(&backends, "python", ResultFilter::empty());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while backends.bus.subscriber_count(&channel) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "Session never subscribed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let live = create_test_document("https://realpython.com/python-generators/", "Python generators");
    pipeline.publish(&live, Some("python")).await.unwrap();

    // Nothing from the bulk query has arrived yet
    assert_eq!(next_result_url(&mut handle).await, live.url);

    handle.close();
    let summary = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("Session did not close while bulk query was pending")
        .unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.bulk_total, None);
}

// ============================================================================
// HTTP API Tests
// ============================================================================

fn app_state(backends: &TestBackends) -> AppState {
    AppState {
        index: backends.index.clone(),
        bus: backends.bus.clone(),
        channels: backends.channels.clone(),
        store: backends.store.clone(),
        frontier: backends.frontier.clone(),
        trigger: CrawlTrigger::new(
            backends.frontier.clone(),
            backends.store.clone(),
            vec!["https://realpython.com/tutorials/all/".to_string()],
        ),
        sessions: SessionManager::new(),
        start_time: Instant::now(),
        config: StreamingConfig::default(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let backends = TestBackends::new();
    let router = StreamServer::new(app_state(&backends)).build_router();

    let response = router
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["active_sessions"], 0);
}

#[tokio::test]
async fn test_crawl_trigger_and_job_lookup() {
    let backends = TestBackends::new();
    let router = StreamServer::new(app_state(&backends)).build_router();

    let request = Request::post("/api/crawl")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"urls":["https://realpython.com/python-testing/"],"query":" Python "}"#,
        ))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["query"], "Python");
    assert_eq!(body["data"]["enqueued"], 1);
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    assert_eq!(
        backends.store.list_snapshot("crawler:pending_urls").await,
        vec!["https://realpython.com/python-testing/"]
    );

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/crawl/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["job_id"], job_id);

    let response = router
        .oneshot(
            Request::get("/api/crawl/no-such-job")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_crawl_request_uses_default_seeds() {
    let backends = TestBackends::new();
    let state = app_state(&backends);
    let router = StreamServer::new(state).build_router();

    let request = Request::post("/api/crawl")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let body = json_body(router.oneshot(request).await.unwrap()).await;

    assert_eq!(body["data"]["seeds"][0], "https://realpython.com/tutorials/all/");
    assert!(body["data"]["query"].is_null());
}

#[tokio::test]
async fn test_stats_endpoint_reports_frontier() {
    let backends = TestBackends::new();
    backends
        .frontier
        .enqueue_all(
            &[
                "https://dev.to/t/python".to_string(),
                "https://dev.to/t/javascript".to_string(),
            ],
            None,
        )
        .await
        .unwrap();
    let router = StreamServer::new(app_state(&backends)).build_router();

    let response = router
        .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["frontier"]["pending"], 2);
    assert_eq!(body["data"]["frontier"]["seen"], 2);
}

#[tokio::test]
async fn test_state_is_shared_with_router() {
    let backends = TestBackends::new();
    let server = StreamServer::new(app_state(&backends));
    let state = server.state();
    state.sessions.register("python").await;

    let response = server
        .build_router()
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await["data"]["active_sessions"], 1);
}
