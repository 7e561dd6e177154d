pub mod coordinator;
pub mod crawl;
pub mod serve;
pub mod worker;

// Re-export command functions for convenience
pub use coordinator::coordinator;
pub use crawl::{crawl, stats};
pub use serve::serve;
pub use worker::worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use resgrep::config::Config;
use resgrep::crawler::Frontier;
use resgrep::publish::{ChannelNames, OpenSearchIndex, RedisEventBus};
use resgrep::storage::{QueueKeys, RedisStore};
use resgrep::utils::retry::{with_retry, RetryConfig};

// ============================================================================
// Shared Wiring
// ============================================================================

/// Backends every process role talks to
pub struct Backends {
    pub store: Arc<RedisStore>,
    pub frontier: Frontier,
    pub channels: ChannelNames,
}

impl Backends {
    /// Connect to the work queue, retrying while Redis comes up
    pub async fn connect(config: &Config) -> Result<Self> {
        let retry = RetryConfig::with_delays(5, 1_000, 10_000);
        let store = with_retry(&retry, || RedisStore::connect(&config.redis))
            .await
            .context("Redis unavailable")?;
        let store = Arc::new(store);

        let frontier = Frontier::new(
            store.clone(),
            QueueKeys::new(config.redis.key_prefix.clone()),
            config.supervisor.distribute_batch,
        );

        Ok(Self {
            store,
            frontier,
            channels: ChannelNames::from_config(&config.events),
        })
    }

    /// Event bus sharing the work-queue pool for publishing
    pub fn event_bus(&self, config: &Config) -> Result<Arc<RedisEventBus>> {
        let bus = RedisEventBus::with_pool(&config.redis, self.store.pool().clone())?;
        Ok(Arc::new(bus))
    }
}

/// Document index with its mapping in place
pub async fn open_index(config: &Config) -> Result<Arc<OpenSearchIndex>> {
    let retry = RetryConfig::with_delays(5, 1_000, 10_000);
    let index = OpenSearchIndex::open(&config.opensearch, &retry)
        .await
        .context("OpenSearch unavailable")?;
    Ok(Arc::new(index))
}

/// Register Prometheus metrics, logging instead of failing
pub fn init_metrics() {
    if let Err(e) = resgrep::metrics::init_metrics() {
        tracing::warn!(error = %e, "Failed to register metrics");
    }
}

// ============================================================================
// Shutdown
// ============================================================================

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to wait for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

/// Watch channel that flips to true on the first shutdown signal
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    rx
}

