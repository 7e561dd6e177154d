//! Real-time event bus
//!
//! Fire-and-forget pub/sub of [`RealtimeEvent`]s on named channels. A
//! subscriber only sees events published after it subscribed. Nothing is
//! persisted or replayed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use deadpool_redis::Pool;
use futures::{future, Stream, StreamExt};
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::{EventsConfig, RedisConfig};
use crate::error::{Error, Result};
use crate::models::RealtimeEvent;
use crate::storage::RedisStore;
use crate::utils::normalize_query;

/// Stream of events received on one channel
pub type Subscription = Pin<Box<dyn Stream<Item = RealtimeEvent> + Send>>;

/// Publish/subscribe transport for real-time events
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `event` on `channel`, returning how many subscribers received it
    async fn publish(&self, channel: &str, event: &RealtimeEvent) -> Result<usize>;

    /// Subscribe to `channel`. The subscription is live once this returns.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

// ============================================================================
// Channel Naming
// ============================================================================

/// Channel names derived from queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    prefix: String,
    global: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self::from_config(&EventsConfig::default())
    }
}

impl ChannelNames {
    pub fn new(prefix: impl Into<String>, global: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            global: global.into(),
        }
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        Self::new(config.channel_prefix.clone(), config.global_channel.clone())
    }

    /// Channel for a query: `<prefix>:<normalized query>`
    pub fn query_channel(&self, query: &str) -> String {
        format!("{}:{}", self.prefix, normalize_query(query))
    }

    /// Channel that receives every newly indexed document
    pub fn global_channel(&self) -> String {
        format!("{}:{}", self.prefix, self.global)
    }
}

// ============================================================================
// Redis Backend
// ============================================================================

/// Event bus over Redis pub/sub
///
/// Publishing goes through the shared pool. Each subscription opens its own
/// dedicated pub/sub connection, closed when the stream is dropped.
pub struct RedisEventBus {
    client: redis::Client,
    pool: Pool,
}

impl RedisEventBus {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let pool = RedisStore::build_pool(config)?;
        Ok(Self { client, pool })
    }

    /// Reuse an existing pool for publishing
    pub fn with_pool(config: &RedisConfig, pool: Pool) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self { client, pool })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, channel: &str, event: &RealtimeEvent) -> Result<usize> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.pool.get().await?;
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        tracing::debug!(channel = %channel, "Subscribed");

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let event = msg
                .get_payload::<String>()
                .map_err(Error::from)
                .and_then(|payload| Ok(serde_json::from_str::<RealtimeEvent>(&payload)?));

            future::ready(match event {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed event");
                    None
                }
            })
        });

        Ok(Box::pin(stream))
    }
}

// ============================================================================
// In-Memory Backend
// ============================================================================

const MEMORY_CHANNEL_CAPACITY: usize = 1024;

/// In-process event bus over tokio broadcast channels
#[derive(Default)]
pub struct MemoryEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<RealtimeEvent>>>,
    published: Mutex<Vec<(String, RealtimeEvent)>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(channel, event)` published so far, in order
    pub fn published(&self) -> Vec<(String, RealtimeEvent)> {
        self.published
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// End every subscription to `channel`
    pub fn close_channel(&self, channel: &str) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.remove(channel);
        }
    }

    /// Current subscriber count of `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(channel).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    fn lock_error() -> Error {
        Error::other("event bus lock poisoned")
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, channel: &str, event: &RealtimeEvent) -> Result<usize> {
        self.published
            .lock()
            .map_err(|_| Self::lock_error())?
            .push((channel.to_string(), event.clone()));

        let channels = self.channels.lock().map_err(|_| Self::lock_error())?;
        let receivers = channels
            .get(channel)
            .and_then(|tx| tx.send(event.clone()).ok())
            .unwrap_or(0);
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let rx = {
            let mut channels = self.channels.lock().map_err(|_| Self::lock_error())?;
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(MEMORY_CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let stream = BroadcastStream::new(rx).filter_map(|item| future::ready(item.ok()));
        Ok(Box::pin(stream))
    }
}
