// Core data structures for resgrep

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Fixed-width hash of a normalized URL
///
/// Used for set membership and as the document id in the index. The URL's
/// string form is never recovered from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 hex digest of the normalized URL
    pub fn of(url: &str) -> Self {
        let normalized = normalize_url(url);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a URL for fingerprinting
///
/// Scheme and host are lowercased by the parser, default ports are
/// dropped and the fragment is removed. Strings that do not parse as a URL
/// are only trimmed.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

/// Kind of resource a crawled page represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Article,
    Tutorial,
    Video,
    Documentation,
    Repository,
}

impl ResourceType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Tutorial => "tutorial",
            Self::Video => "video",
            Self::Documentation => "documentation",
            Self::Repository => "repository",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Crawled resource as stored in the document index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDocument {
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub code_snippets: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub domain: String,
    #[serde(rename = "type", default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub quality_score: f32,
    pub timestamp: DateTime<Utc>,
}

impl ResourceDocument {
    /// Content address of this document: the fingerprint of its URL
    pub fn document_id(&self) -> Fingerprint {
        Fingerprint::of(&self.url)
    }

    /// Primary detected language, if any
    pub fn primary_language(&self) -> Option<&str> {
        self.languages.first().map(String::as_str)
    }

    /// Reduce to the real-time event projection
    pub fn to_event(&self, score: Option<u32>) -> RealtimeEvent {
        RealtimeEvent {
            id: self.document_id().to_string(),
            url: self.url.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            resource_type: self.resource_type,
            domain: self.domain.clone(),
            timestamp: self.timestamp,
            language: self.primary_language().map(String::from),
            score,
        }
    }
}

/// Lightweight notification that a document was indexed
///
/// Published on the event bus and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeEvent {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

/// Record of one crawl trigger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlJob {
    pub job_id: String,
    #[serde(default)]
    pub query: Option<String>,
    pub seeds: Vec<String>,
    /// Seeds that were newly admitted to the frontier
    pub enqueued: usize,
    pub created_at: DateTime<Utc>,
}
