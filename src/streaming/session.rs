//! Streaming search session
//!
//! One session serves one client connection for one query. It subscribes
//! to the query's live channel first, then launches the bulk query as a
//! separate task, and merges both sources into a single stream of results.
//! Every result passes the session's seen set (first delivery wins) and the
//! client's filter before it is sent.
//!
//! ```text
//! connecting -> active -> draining -> closed
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::metrics;
use crate::models::Fingerprint;
use crate::publish::{ChannelNames, DocumentIndex, EventBus, Subscription};
use crate::utils::retry::{with_retry, RetryConfig};

use super::filter::ResultFilter;
use super::messages::{ClientMessage, ServerMessage, StreamResult, BULK_COMPLETE_MESSAGE};

// ============================================================================
// Client Channel
// ============================================================================

/// Inbound frame from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close,
}

/// Bidirectional connection to one client
#[async_trait]
pub trait ClientChannel: Send {
    /// Send one message. An error means the client is gone.
    async fn send(&mut self, message: ServerMessage) -> Result<()>;

    /// Next inbound frame, `None` once the connection is closed
    async fn recv(&mut self) -> Option<ClientFrame>;

    /// Transport-level liveness probe
    async fn keepalive(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-process client backed by mpsc channels
pub struct MpscClient {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    inbound: mpsc::UnboundedReceiver<ClientFrame>,
}

/// The far end of an [`MpscClient`]
pub struct MpscClientHandle {
    pub messages: mpsc::UnboundedReceiver<ServerMessage>,
    frames: mpsc::UnboundedSender<ClientFrame>,
}

impl MpscClient {
    pub fn pair() -> (MpscClient, MpscClientHandle) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            MpscClient {
                outbound: out_tx,
                inbound: in_rx,
            },
            MpscClientHandle {
                messages: out_rx,
                frames: in_tx,
            },
        )
    }
}

impl MpscClientHandle {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.frames.send(ClientFrame::Text(text.into()));
    }

    pub fn close(&self) {
        let _ = self.frames.send(ClientFrame::Close);
    }

    /// Next message from the session, `None` once it has closed
    pub async fn next_message(&mut self) -> Option<ServerMessage> {
        self.messages.recv().await
    }
}

#[async_trait]
impl ClientChannel for MpscClient {
    async fn send(&mut self, message: ServerMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| Error::Session("client receiver dropped".into()))
    }

    async fn recv(&mut self) -> Option<ClientFrame> {
        self.inbound.recv().await
    }
}

// ============================================================================
// Session
// ============================================================================

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub delivered: usize,
    pub duplicates: usize,
    pub filtered: usize,

    /// Total reported by the bulk query, if it completed
    pub bulk_total: Option<u64>,
}

enum BulkItem {
    Stats { total: u64, took: u64 },
    Hit(StreamResult),
    Done,
    Failed(String),
}

/// Merges the bulk query and the live feed for one client
pub struct SearchSession {
    query: String,
    filter: ResultFilter,
    index: Arc<dyn DocumentIndex>,
    bus: Arc<dyn EventBus>,
    channel: String,
    bulk_size: usize,
    keepalive: Duration,
    resubscribe: RetryConfig,
    seen: HashSet<Fingerprint>,
    state: SessionState,
    summary: SessionSummary,
}

impl SearchSession {
    pub fn new(
        query: impl Into<String>,
        filter: ResultFilter,
        index: Arc<dyn DocumentIndex>,
        bus: Arc<dyn EventBus>,
        channels: &ChannelNames,
    ) -> Self {
        let query = query.into();
        Self {
            channel: channels.query_channel(&query),
            query,
            filter,
            index,
            bus,
            bulk_size: 100,
            keepalive: Duration::from_secs(1),
            resubscribe: RetryConfig::with_delays(3, 200, 2_000),
            seen: HashSet::new(),
            state: SessionState::Connecting,
            summary: SessionSummary::default(),
        }
    }

    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = bulk_size.max(1);
        self
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Live channel this session listens on
    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(query = %self.query, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    async fn subscribe(&self) -> Result<Subscription> {
        with_retry(&self.resubscribe, || self.bus.subscribe(&self.channel)).await
    }

    fn spawn_bulk(&self) -> (mpsc::Receiver<BulkItem>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let index = Arc::clone(&self.index);
        let query = self.query.clone();
        let filter = self.filter.clone();
        let size = self.bulk_size;

        let handle = tokio::spawn(async move {
            match index.search(&query, &filter, size).await {
                Ok(response) => {
                    let stats = BulkItem::Stats {
                        total: response.total,
                        took: response.took,
                    };
                    if tx.send(stats).await.is_err() {
                        return;
                    }
                    for hit in response.hits {
                        if tx.send(BulkItem::Hit(StreamResult::from_hit(hit))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(BulkItem::Done).await;
                }
                Err(e) => {
                    let _ = tx.send(BulkItem::Failed(e.to_string())).await;
                }
            }
        });

        (rx, handle)
    }

    /// Seen check, then filter, then deliver
    async fn offer<C: ClientChannel + ?Sized>(
        &mut self,
        client: &mut C,
        result: StreamResult,
    ) -> Result<()> {
        let source = result.source.as_str();

        if !self.seen.insert(Fingerprint::of(&result.url)) {
            self.summary.duplicates += 1;
            metrics::record_stream_result(source, "duplicate");
            return Ok(());
        }

        if !self.filter.matches(&result) {
            self.summary.filtered += 1;
            metrics::record_stream_result(source, "filtered");
            return Ok(());
        }

        client.send(ServerMessage::Result { data: result }).await?;
        self.summary.delivered += 1;
        metrics::record_stream_result(source, "delivered");
        Ok(())
    }

    async fn handle_frame<C: ClientChannel + ?Sized>(
        &mut self,
        client: &mut C,
        text: &str,
    ) -> Result<()> {
        match ClientMessage::parse(text) {
            Ok(ClientMessage::Ping) => client.send(ServerMessage::status("pong")).await,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable client message");
                client.send(ServerMessage::error(e.to_string())).await
            }
        }
    }

    /// Serve `client` until it disconnects or the live feed is lost for good
    pub async fn run<C: ClientChannel + ?Sized>(mut self, client: &mut C) -> SessionSummary {
        let mut live = match self.subscribe().await {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "Subscribe failed");
                let _ = client.send(ServerMessage::error(format!("Search error: {e}"))).await;
                self.transition(SessionState::Closed);
                return self.summary;
            }
        };

        let (mut bulk_rx, bulk_task) = self.spawn_bulk();
        let mut bulk_done = false;
        let mut keepalive = tokio::time::interval(self.keepalive);
        keepalive.tick().await;

        self.transition(SessionState::Active);
        tracing::info!(query = %self.query, channel = %self.channel, "Session active");

        loop {
            let step: Result<bool> = tokio::select! {
                frame = client.recv() => match frame {
                    Some(ClientFrame::Text(text)) => self.handle_frame(client, &text).await.map(|_| true),
                    Some(ClientFrame::Close) | None => Ok(false),
                },

                item = bulk_rx.recv(), if !bulk_done => match item {
                    Some(BulkItem::Stats { total, took }) => {
                        self.summary.bulk_total = Some(total);
                        client.send(ServerMessage::Stats { total, took }).await.map(|_| true)
                    }
                    Some(BulkItem::Hit(result)) => self.offer(client, result).await.map(|_| true),
                    Some(BulkItem::Done) => {
                        bulk_done = true;
                        client.send(ServerMessage::status(BULK_COMPLETE_MESSAGE)).await.map(|_| true)
                    }
                    Some(BulkItem::Failed(message)) => {
                        bulk_done = true;
                        tracing::warn!(query = %self.query, error = %message, "Bulk query failed");
                        client
                            .send(ServerMessage::error(format!("Search error: {message}")))
                            .await
                            .map(|_| true)
                    }
                    None => {
                        bulk_done = true;
                        Ok(true)
                    }
                },

                event = live.next() => match event {
                    Some(event) => self.offer(client, StreamResult::from_event(event)).await.map(|_| true),
                    None => {
                        tracing::info!(channel = %self.channel, "Live feed ended, resubscribing");
                        match self.subscribe().await {
                            Ok(fresh) => {
                                live = fresh;
                                Ok(true)
                            }
                            Err(e) => {
                                let _ = client
                                    .send(ServerMessage::error(format!("Search error: {e}")))
                                    .await;
                                Ok(false)
                            }
                        }
                    }
                },

                _ = keepalive.tick() => client.keepalive().await.map(|_| true),
            };

            match step {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::debug!(query = %self.query, error = %e, "Client gone");
                    break;
                }
            }
        }

        self.transition(SessionState::Draining);
        bulk_task.abort();
        drop(live);
        self.transition(SessionState::Closed);

        tracing::info!(
            query = %self.query,
            delivered = self.summary.delivered,
            duplicates = self.summary.duplicates,
            filtered = self.summary.filtered,
            "Session closed"
        );
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RealtimeEvent, ResourceDocument, ResourceType};
    use crate::publish::{MemoryEventBus, MemoryIndex};
    use chrono::Utc;

    fn document(url: &str, title: &str) -> ResourceDocument {
        ResourceDocument {
            url: url.into(),
            title: title.into(),
            description: String::new(),
            content: None,
            code_snippets: vec![],
            tags: vec![],
            domain: "example.com".into(),
            resource_type: ResourceType::Article,
            languages: vec![],
            quality_score: 0.0,
            timestamp: Utc::now(),
        }
    }

    fn event(url: &str) -> RealtimeEvent {
        document(url, "python").to_event(Some(1))
    }

    async fn next_non_status(handle: &mut MpscClientHandle) -> ServerMessage {
        loop {
            match handle.next_message().await.unwrap() {
                ServerMessage::Status { .. } => continue,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn test_live_duplicate_of_bulk_is_dropped() {
        let index = Arc::new(MemoryIndex::new());
        let d = document("https://example.com/a", "python basics");
        index.upsert(&d.document_id(), &d).await.unwrap();
        let bus = Arc::new(MemoryEventBus::new());
        let channel = ChannelNames::default().query_channel("python");

        let session = SearchSession::new(
            "python",
            ResultFilter::empty(),
            index,
            bus.clone(),
            &ChannelNames::default(),
        );
        let (mut client, mut handle) = MpscClient::pair();
        let task = tokio::spawn(async move { session.run(&mut client).await });

        // stats, result(a), bulk complete
        assert!(matches!(handle.next_message().await, Some(ServerMessage::Stats { total: 1, .. })));
        assert!(matches!(handle.next_message().await, Some(ServerMessage::Result { .. })));
        assert_eq!(
            handle.next_message().await,
            Some(ServerMessage::status(BULK_COMPLETE_MESSAGE))
        );

        bus.publish(&channel, &event("https://example.com/a")).await.unwrap();
        bus.publish(&channel, &event("https://example.com/b")).await.unwrap();

        match next_non_status(&mut handle).await {
            ServerMessage::Result { data } => assert_eq!(data.url, "https://example.com/b"),
            other => panic!("unexpected message: {other:?}"),
        }

        handle.close();
        let summary = task.await.unwrap();
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.duplicates, 1);
    }

    #[tokio::test]
    async fn test_ping_and_garbage() {
        let session = SearchSession::new(
            "rust",
            ResultFilter::empty(),
            Arc::new(MemoryIndex::new()),
            Arc::new(MemoryEventBus::new()),
            &ChannelNames::default(),
        )
        .with_keepalive(Duration::from_secs(60));
        let (mut client, mut handle) = MpscClient::pair();
        let task = tokio::spawn(async move { session.run(&mut client).await });

        // Empty bulk: stats then completion
        assert!(matches!(handle.next_message().await, Some(ServerMessage::Stats { total: 0, .. })));
        assert_eq!(
            handle.next_message().await,
            Some(ServerMessage::status(BULK_COMPLETE_MESSAGE))
        );

        handle.send_text(r#"{"type":"ping"}"#);
        assert_eq!(handle.next_message().await, Some(ServerMessage::status("pong")));

        handle.send_text("not json");
        assert!(matches!(handle.next_message().await, Some(ServerMessage::Error { .. })));

        handle.close();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_failure_keeps_live_feed() {
        let index = Arc::new(MemoryIndex::new());
        index.fail_searches("index down").await;
        let bus = Arc::new(MemoryEventBus::new());
        let channel = ChannelNames::default().query_channel("python");

        let session = SearchSession::new(
            "python",
            ResultFilter::empty(),
            index,
            bus.clone(),
            &ChannelNames::default(),
        );
        let (mut client, mut handle) = MpscClient::pair();
        let task = tokio::spawn(async move { session.run(&mut client).await });

        match handle.next_message().await {
            Some(ServerMessage::Error { message }) => assert!(message.starts_with("Search error: ")),
            other => panic!("unexpected message: {other:?}"),
        }

        bus.publish(&channel, &event("https://example.com/live")).await.unwrap();
        assert!(matches!(next_non_status(&mut handle).await, ServerMessage::Result { .. }));

        handle.close();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_feed_resubscribes() {
        let bus = Arc::new(MemoryEventBus::new());
        let channel = ChannelNames::default().query_channel("python");
        let session = SearchSession::new(
            "python",
            ResultFilter::empty(),
            Arc::new(MemoryIndex::new()),
            bus.clone(),
            &ChannelNames::default(),
        );
        let (mut client, mut handle) = MpscClient::pair();
        let task = tokio::spawn(async move { session.run(&mut client).await });

        assert!(matches!(handle.next_message().await, Some(ServerMessage::Stats { .. })));
        assert!(matches!(handle.next_message().await, Some(ServerMessage::Status { .. })));

        // Closing the channel ends the stream; the next subscribe succeeds
        bus.close_channel(&channel);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.subscriber_count(&channel), 1);

        handle.close();
        task.await.unwrap();
    }
}
