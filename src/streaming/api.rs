//! HTTP and WebSocket routes of the streaming server

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crawler::{CrawlRequest, FrontierStats};
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::CrawlJob;

use super::filter::ResultFilter;
use super::messages::ServerMessage;
use super::server::AppState;
use super::session::{ClientChannel, ClientFrame, SearchSession};

// ============================================================================
// Response Types
// ============================================================================

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub queue_store: bool,
    pub active_sessions: usize,
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub frontier: FrontierStats,
    pub active_sessions: usize,
}

/// Query string of the search endpoint
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,

    /// JSON object of `field: value` pairs
    #[serde(default)]
    pub filters: Option<String>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/search", get(ws_search))
        .route("/api/crawl", post(trigger_crawl))
        .route("/api/crawl/{job_id}", get(get_crawl_job))
        .route("/api/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let queue_store = state.store.ping().await.is_ok();

    Json(ApiResponse::success(HealthResponse {
        status: if queue_store { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        queue_store,
        active_sessions: state.sessions.count().await,
    }))
}

/// Frontier counters
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.frontier.stats(&[]).await {
        Ok(frontier) => (
            StatusCode::OK,
            Json(ApiResponse::success(StatsResponse {
                frontier,
                active_sessions: state.sessions.count().await,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<StatsResponse>::error(e.to_string())),
        ),
    }
}

/// Crawl trigger
async fn trigger_crawl(
    State(state): State<AppState>,
    Json(request): Json<CrawlRequest>,
) -> impl IntoResponse {
    match state.trigger.trigger(request).await {
        Ok(job) => (StatusCode::OK, Json(ApiResponse::success(job))),
        Err(e) => {
            tracing::warn!(error = %e, "Crawl trigger failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<CrawlJob>::error(e.to_string())),
            )
        }
    }
}

/// Recorded crawl job
async fn get_crawl_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.trigger.job(&job_id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(ApiResponse::success(job))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<CrawlJob>::error(format!("Job not found: {job_id}"))),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<CrawlJob>::error(e.to_string())),
        ),
    }
}

/// Prometheus text exposition
async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Streaming search over a WebSocket
async fn ws_search(
    ws: WebSocketUpgrade,
    Query(params): Query<SearchParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(socket: WebSocket, params: SearchParams, state: AppState) {
    let mut client = WsClient { socket };

    let query = params.query.trim().to_string();
    if query.is_empty() {
        let _ = client.send(ServerMessage::error("Missing query")).await;
        client.close().await;
        return;
    }

    let filter = match ResultFilter::from_json_str(params.filters.as_deref().unwrap_or("")) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting connection with invalid filters");
            let _ = client.send(ServerMessage::error(e.to_string())).await;
            client.close().await;
            return;
        }
    };

    let client_id = state.sessions.register(&query).await;

    let session = SearchSession::new(
        query,
        filter,
        state.index.clone(),
        state.bus.clone(),
        &state.channels,
    )
    .with_bulk_size(state.config.bulk_result_size)
    .with_keepalive(state.config.keepalive_interval());

    session.run(&mut client).await;
    client.close().await;
    state.sessions.unregister(&client_id).await;
}

// ============================================================================
// WebSocket Channel
// ============================================================================

struct WsClient {
    socket: WebSocket,
}

impl WsClient {
    async fn close(&mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

#[async_trait]
impl ClientChannel for WsClient {
    async fn send(&mut self, message: ServerMessage) -> Result<()> {
        let text = message.to_json()?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::Session(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ClientFrame> {
        loop {
            match self.socket.recv().await? {
                Ok(Message::Text(text)) => return Some(ClientFrame::Text(text.as_str().to_string())),
                Ok(Message::Close(_)) => return Some(ClientFrame::Close),
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive failed");
                    return None;
                }
            }
        }
    }

    async fn keepalive(&mut self) -> Result<()> {
        self.socket
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| Error::Session(e.to_string()))
    }
}
