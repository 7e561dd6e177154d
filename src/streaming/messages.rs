//! Wire messages of the streaming search endpoint
//!
//! Server messages are JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "stats", "total": 42, "took": 7}
//! {"type": "result", "data": {"url": "...", "source": "index", ...}}
//! {"type": "status", "message": "Initial search complete, streaming real-time results"}
//! {"type": "error", "message": "Search error: ..."}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{RealtimeEvent, ResourceType};
use crate::publish::index::SearchHit;

/// Status text sent once the bulk query has been fully delivered
pub const BULK_COMPLETE_MESSAGE: &str = "Initial search complete, streaming real-time results";

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// Bulk query against the document index
    Index,
    /// Live event feed
    Realtime,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Realtime => "realtime",
        }
    }
}

/// One result as delivered to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResult {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
    pub source: ResultSource,
}

impl StreamResult {
    /// Result from the bulk query
    pub fn from_hit(hit: SearchHit) -> Self {
        let doc = hit.document;
        Self {
            id: hit.id,
            language: doc.languages.first().cloned(),
            url: doc.url,
            title: doc.title,
            description: doc.description,
            resource_type: doc.resource_type,
            domain: doc.domain,
            languages: doc.languages,
            timestamp: doc.timestamp,
            score: Some(hit.score),
            highlights: hit.highlights,
            source: ResultSource::Index,
        }
    }

    /// Result from the live feed
    pub fn from_event(event: RealtimeEvent) -> Self {
        Self {
            id: event.id,
            url: event.url,
            title: event.title,
            description: event.description,
            resource_type: event.resource_type,
            domain: event.domain,
            language: event.language,
            languages: Vec::new(),
            timestamp: event.timestamp,
            score: event.score.map(|s| s as f32),
            highlights: Vec::new(),
            source: ResultSource::Realtime,
        }
    }
}

/// Message pushed to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Bulk query totals
    Stats { total: u64, took: u64 },
    /// One deduplicated, filtered result
    Result { data: StreamResult },
    /// Informational status
    Status { message: String },
    /// Error report, the connection may stay open
    Error { message: String },
}

impl ServerMessage {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize for a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Control message accepted from the client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Liveness probe, answered with a `pong` status
    Ping,
}

impl ClientMessage {
    /// Parse an inbound text frame
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::parse(format!("Invalid message: {e}")))
    }
}
