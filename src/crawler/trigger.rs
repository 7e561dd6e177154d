//! Crawl trigger
//!
//! Accepts seed URLs and an optional query from an external caller, admits
//! the seeds to the frontier and records the job.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::CrawlJob;
use crate::storage::{QueueKeys, QueueStore};

use super::frontier::Frontier;

/// Body of a crawl trigger call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CrawlRequest {
    /// Seed URLs. The default seeds are used when empty.
    #[serde(default)]
    pub urls: Vec<String>,

    /// Query of this crawl run
    #[serde(default)]
    pub query: Option<String>,
}

/// Admits crawl requests to the frontier
#[derive(Clone)]
pub struct CrawlTrigger {
    frontier: Frontier,
    store: Arc<dyn QueueStore>,
    keys: QueueKeys,
    default_seeds: Vec<String>,
}

impl CrawlTrigger {
    pub fn new(frontier: Frontier, store: Arc<dyn QueueStore>, default_seeds: Vec<String>) -> Self {
        let keys = frontier.keys().clone();
        Self {
            frontier,
            store,
            keys,
            default_seeds,
        }
    }

    /// Enqueue the request's seeds and return the recorded job
    pub async fn trigger(&self, request: CrawlRequest) -> Result<CrawlJob> {
        let seeds: Vec<String> = request
            .urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let seeds = if seeds.is_empty() {
            self.default_seeds.clone()
        } else {
            seeds
        };
        let query = request
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let enqueued = self.frontier.enqueue_all(&seeds, query.as_deref()).await?;

        let job = CrawlJob {
            job_id: Uuid::new_v4().to_string(),
            query,
            seeds,
            enqueued,
            created_at: Utc::now(),
        };

        self.store
            .hash_set(&self.keys.jobs(), &job.job_id, &serde_json::to_string(&job)?)
            .await?;

        tracing::info!(
            job_id = %job.job_id,
            seeds = job.seeds.len(),
            enqueued = job.enqueued,
            query = job.query.as_deref().unwrap_or(""),
            "Crawl triggered"
        );
        Ok(job)
    }

    /// Look up a recorded job
    pub async fn job(&self, job_id: &str) -> Result<Option<CrawlJob>> {
        match self.store.hash_get(&self.keys.jobs(), job_id).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
