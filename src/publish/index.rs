//! Document index: upsert by content address and weighted text search
//!
//! [`OpenSearchIndex`] is the production backend; [`MemoryIndex`] gives the
//! same contract in-process for tests.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    ExistsParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use url::Url;

use crate::config::OpenSearchConfig;
use crate::error::{Error, Result};
use crate::models::{Fingerprint, ResourceDocument};
use crate::streaming::filter::ResultFilter;
use crate::utils::retry::{with_retry, RetryConfig};

// ============================================================================
// Contract
// ============================================================================

/// One ranked hit of a bulk query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub document: ResourceDocument,
    pub highlights: Vec<String>,
}

/// Bulk query response, hits in relevance order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Total matching documents (may exceed `hits.len()`)
    pub total: u64,

    /// Server-side query time in milliseconds
    pub took: u64,

    pub hits: Vec<SearchHit>,
}

/// Full-text store of resource documents
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Create the index with its mapping if it does not exist
    async fn ensure_index(&self) -> Result<()>;

    /// Whether a document with this id exists
    async fn exists(&self, id: &Fingerprint) -> Result<bool>;

    /// Insert or replace the document stored under `id`
    async fn upsert(&self, id: &Fingerprint, document: &ResourceDocument) -> Result<()>;

    /// Ranked search, at most `size` hits
    async fn search(&self, query: &str, filter: &ResultFilter, size: usize)
        -> Result<SearchResponse>;
}

// ============================================================================
// Query Construction
// ============================================================================

/// Index mapping for resource documents
pub fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "url": { "type": "keyword" },
                "title": { "type": "text" },
                "description": { "type": "text" },
                "content": { "type": "text" },
                "code_snippets": { "type": "text" },
                "tags": { "type": "keyword" },
                "domain": { "type": "keyword" },
                "type": { "type": "keyword" },
                "languages": { "type": "keyword" },
                "quality_score": { "type": "float" },
                "timestamp": { "type": "date" }
            }
        }
    })
}

/// Search body: weighted multi-match plus one clause per filter field
pub fn build_search_body(query: &str, filter: &ResultFilter, size: usize) -> Value {
    let must = if query.trim().is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({
            "multi_match": {
                "query": query,
                "fields": ["title^3", "description^2", "content", "code_snippets^2", "tags^2"]
            }
        })
    };

    let filters: Vec<Value> = filter
        .fields()
        .map(|(field, value)| match field {
            "language" | "languages" => json!({
                "bool": {
                    "should": [
                        { "term": { "language": value } },
                        { "term": { "languages": value } }
                    ],
                    "minimum_should_match": 1
                }
            }),
            _ => json!({ "term": { field: value } }),
        })
        .collect();

    json!({
        "query": {
            "bool": {
                "must": [must],
                "filter": filters
            }
        },
        "highlight": {
            "fields": {
                "content": {},
                "code_snippets": {}
            }
        },
        "size": size
    })
}

/// Parse an OpenSearch search response body
pub fn parse_search_response(body: &Value) -> Result<SearchResponse> {
    let took = body["took"].as_u64().unwrap_or(0);

    let total = match &body["hits"]["total"] {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        other => other["value"].as_u64().unwrap_or(0),
    };

    let raw_hits = body["hits"]["hits"]
        .as_array()
        .ok_or_else(|| Error::connectivity("opensearch", "search response without hits"))?;

    let mut hits = Vec::with_capacity(raw_hits.len());
    for raw in raw_hits {
        let document: ResourceDocument = match serde_json::from_value(raw["_source"].clone()) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, id = %raw["_id"], "Skipping malformed document");
                continue;
            }
        };

        let mut highlights = Vec::new();
        for field in ["content", "code_snippets"] {
            if let Some(fragments) = raw["highlight"][field].as_array() {
                highlights.extend(fragments.iter().filter_map(|f| f.as_str().map(String::from)));
            }
        }

        hits.push(SearchHit {
            id: raw["_id"].as_str().unwrap_or_default().to_string(),
            score: raw["_score"].as_f64().unwrap_or(0.0) as f32,
            document,
            highlights,
        });
    }

    Ok(SearchResponse { total, took, hits })
}

// ============================================================================
// OpenSearch Backend
// ============================================================================

/// OpenSearch client wrapper
pub struct OpenSearchIndex {
    client: OpenSearch,
    index_name: String,
}

impl OpenSearchIndex {
    /// Create a client for the configured endpoint
    pub fn new(config: &OpenSearchConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::config(format!("Invalid OpenSearch URL: {e}")))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(user.clone(), password.clone()));
        }
        let transport = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build OpenSearch transport: {e}")))?;

        Ok(Self {
            client: OpenSearch::new(transport),
            index_name: config.index_name.clone(),
        })
    }

    /// Connect and make sure the index exists, retrying while the cluster comes up
    pub async fn open(config: &OpenSearchConfig, retry: &RetryConfig) -> Result<Self> {
        let index = Self::new(config)?;
        with_retry(retry, || index.ensure_index()).await?;
        tracing::info!(index = %index.index_name, "Document index ready");
        Ok(index)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn unexpected(status: u16, action: &str) -> Error {
        Error::connectivity("opensearch", format!("{action} returned status {status}"))
    }
}

#[async_trait]
impl DocumentIndex for OpenSearchIndex {
    async fn ensure_index(&self) -> Result<()> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index_name]))
            .send()
            .await?;

        if response.status_code().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index_name))
            .body(index_mapping())
            .send()
            .await?;

        let status = response.status_code().as_u16();
        if response.status_code().is_success() {
            tracing::info!(index = %self.index_name, "Created index");
            return Ok(());
        }

        // Another process may have created it between the two calls
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if body["error"]["type"] == "resource_already_exists_exception" {
            return Ok(());
        }

        Err(Self::unexpected(status, "index creation"))
    }

    async fn exists(&self, id: &Fingerprint) -> Result<bool> {
        let response = self
            .client
            .exists(ExistsParts::IndexId(&self.index_name, id.as_str()))
            .send()
            .await?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(Self::unexpected(status, "document existence check")),
        }
    }

    async fn upsert(&self, id: &Fingerprint, document: &ResourceDocument) -> Result<()> {
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index_name, id.as_str()))
            .body(document)
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(Self::unexpected(response.status_code().as_u16(), "document upsert"));
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        filter: &ResultFilter,
        size: usize,
    ) -> Result<SearchResponse> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(build_search_body(query, filter, size))
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(Self::unexpected(response.status_code().as_u16(), "search"));
        }

        let body: Value = response.json().await?;
        parse_search_response(&body)
    }
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// In-process index with term-count ranking
#[derive(Default)]
pub struct MemoryIndex {
    documents: RwLock<BTreeMap<String, ResourceDocument>>,
    failure: RwLock<Option<String>>,
    search_delay: RwLock<Option<Duration>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent search fail with `message`
    pub async fn fail_searches(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    /// Delay every subsequent search
    pub async fn delay_searches(&self, delay: Duration) {
        *self.search_delay.write().await = Some(delay);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn get(&self, id: &Fingerprint) -> Option<ResourceDocument> {
        self.documents.read().await.get(id.as_str()).cloned()
    }

    fn score(document: &ResourceDocument, terms: &[String]) -> f32 {
        let count = |text: &str, weight: f32| -> f32 {
            let text = text.to_lowercase();
            terms
                .iter()
                .map(|t| text.matches(t.as_str()).count() as f32 * weight)
                .sum()
        };

        count(&document.title, 3.0)
            + count(&document.description, 2.0)
            + count(document.content.as_deref().unwrap_or_default(), 1.0)
            + count(&document.code_snippets.join(" "), 2.0)
            + count(&document.tags.join(" "), 2.0)
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, id: &Fingerprint) -> Result<bool> {
        Ok(self.documents.read().await.contains_key(id.as_str()))
    }

    async fn upsert(&self, id: &Fingerprint, document: &ResourceDocument) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        filter: &ResultFilter,
        size: usize,
    ) -> Result<SearchResponse> {
        let started = Instant::now();

        if let Some(delay) = *self.search_delay.read().await {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failure.read().await.clone() {
            return Err(Error::connectivity("index", message));
        }

        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let documents = self.documents.read().await;

        let mut hits: Vec<SearchHit> = documents
            .iter()
            .filter(|(_, doc)| filter.matches(*doc))
            .filter_map(|(id, doc)| {
                let score = if terms.is_empty() { 1.0 } else { Self::score(doc, &terms) };
                (score > 0.0).then(|| SearchHit {
                    id: id.clone(),
                    score,
                    document: doc.clone(),
                    highlights: Vec::new(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        let total = hits.len() as u64;
        hits.truncate(size);

        Ok(SearchResponse {
            total,
            took: started.elapsed().as_millis() as u64,
            hits,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
