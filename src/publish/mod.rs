//! Publish pipeline: index write followed by real-time fan-out
//!
//! A document is upserted under its fingerprint. Newly created documents are
//! announced on the global channel, and on the query channel of the crawl
//! run that discovered them. Updates are only announced when a query is
//! known, so a re-crawl of a known page does not flood the global channel.

pub mod events;
pub mod index;

use std::sync::Arc;

use crate::error::Result;
use crate::metrics;
use crate::models::ResourceDocument;

pub use self::events::{ChannelNames, EventBus, MemoryEventBus, RedisEventBus, Subscription};
pub use self::index::{DocumentIndex, MemoryIndex, OpenSearchIndex, SearchHit, SearchResponse};

/// Whether the index write created or replaced the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Updated,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

/// Result of publishing one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub document_id: String,
    pub outcome: PublishOutcome,

    /// Channels the event was sent on
    pub channels: Vec<String>,
}

/// Number of query-term occurrences in title and description
///
/// Terms are the whitespace-separated words of the query, matched
/// case-insensitively as substrings.
pub fn relevance_score(document: &ResourceDocument, query: &str) -> u32 {
    let haystack = format!("{} {}", document.title, document.description).to_lowercase();
    query
        .split_whitespace()
        .map(|term| haystack.matches(&term.to_lowercase()).count() as u32)
        .sum()
}

/// Index write plus event fan-out
#[derive(Clone)]
pub struct PublishPipeline {
    index: Arc<dyn DocumentIndex>,
    bus: Arc<dyn EventBus>,
    channels: ChannelNames,
}

impl PublishPipeline {
    pub fn new(index: Arc<dyn DocumentIndex>, bus: Arc<dyn EventBus>, channels: ChannelNames) -> Self {
        Self {
            index,
            bus,
            channels,
        }
    }

    pub fn index(&self) -> &Arc<dyn DocumentIndex> {
        &self.index
    }

    /// Upsert `document` and announce it
    ///
    /// Index failures are returned. Event publish failures are logged and
    /// otherwise ignored; the document stays indexed either way.
    pub async fn publish(
        &self,
        document: &ResourceDocument,
        query: Option<&str>,
    ) -> Result<PublishReport> {
        let id = document.document_id();
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let outcome = if self.index.exists(&id).await? {
            PublishOutcome::Updated
        } else {
            PublishOutcome::Created
        };
        self.index.upsert(&id, document).await?;
        metrics::record_document_published(outcome.as_str());

        let mut report = PublishReport {
            document_id: id.to_string(),
            outcome,
            channels: Vec::new(),
        };

        if outcome == PublishOutcome::Updated && query.is_none() {
            tracing::debug!(url = %document.url, "Updated document, no query to notify");
            return Ok(report);
        }

        let global = self.channels.global_channel();
        self.emit(&global, document.to_event(None), "global", &mut report)
            .await;

        if let Some(query) = query {
            let channel = self.channels.query_channel(query);
            let event = document.to_event(Some(relevance_score(document, query)));
            self.emit(&channel, event, "query", &mut report).await;
        }

        tracing::info!(
            url = %document.url,
            outcome = outcome.as_str(),
            channels = report.channels.len(),
            "Published document"
        );
        Ok(report)
    }

    async fn emit(
        &self,
        channel: &str,
        event: crate::models::RealtimeEvent,
        kind: &str,
        report: &mut PublishReport,
    ) {
        match self.bus.publish(channel, &event).await {
            Ok(receivers) => {
                tracing::debug!(channel = %channel, receivers, "Event published");
                metrics::record_event_published(kind);
                report.channels.push(channel.to_string());
            }
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Failed to publish event");
            }
        }
    }
}
