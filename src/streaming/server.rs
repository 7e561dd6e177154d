//! Streaming server
//!
//! Serves the WebSocket search endpoint next to a small HTTP API for
//! crawl triggers, health and stats.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::StreamingConfig;
use crate::crawler::{CrawlTrigger, Frontier};
use crate::error::{Error, Result};
use crate::publish::{ChannelNames, DocumentIndex, EventBus};
use crate::storage::QueueStore;

use super::api::create_router;
use super::manager::SessionManager;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<dyn DocumentIndex>,
    pub bus: Arc<dyn EventBus>,
    pub channels: ChannelNames,
    pub store: Arc<dyn QueueStore>,
    pub frontier: Frontier,
    pub trigger: CrawlTrigger,
    pub sessions: SessionManager,

    /// Server start time
    pub start_time: Instant,

    pub config: StreamingConfig,
}

// ============================================================================
// Stream Server
// ============================================================================

/// HTTP/WebSocket server for streaming search
pub struct StreamServer {
    config: StreamingConfig,
    state: AppState,
}

impl StreamServer {
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config.clone(),
            state,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.config.bind_address
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::with_source(format!("Failed to bind {addr}"), e))?;

        tracing::info!(addr = %addr, "Streaming server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        tracing::info!("Streaming server shutdown complete");
        Ok(())
    }
}
