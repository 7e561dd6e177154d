//! Crawl worker loop
//!
//! A worker owns one queue of the frontier. It pops URLs in batches,
//! fetches and extracts each one, feeds followable links back into the
//! frontier and hands extracted resources to the publish pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Result;
use crate::metrics;
use crate::models::Fingerprint;
use crate::publish::{PublishPipeline, PublishReport};

use super::extract::ResourceExtractor;
use super::frontier::Frontier;
use super::url::UrlPolicy;
use super::PageFetcher;

/// Why a URL produced no document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fingerprint already visited
    Duplicate,
    /// Page did not qualify as a resource
    Extraction,
}

/// Result of processing one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlOutcome {
    Published(PublishReport),
    Skipped(SkipReason),
    /// Fetch failed after retries; the URL is marked visited
    Failed(String),
}

impl UrlOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published(_) => "published",
            Self::Skipped(SkipReason::Duplicate) => "duplicate",
            Self::Skipped(SkipReason::Extraction) => "extraction_skip",
            Self::Failed(_) => "failed",
        }
    }
}

/// Totals over a worker's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl WorkerSummary {
    fn record(&mut self, outcome: &UrlOutcome) {
        self.processed += 1;
        match outcome {
            UrlOutcome::Published(_) => self.published += 1,
            UrlOutcome::Skipped(_) => self.skipped += 1,
            UrlOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// One crawl worker bound to its frontier queue
pub struct CrawlWorker {
    worker_id: String,
    frontier: Frontier,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ResourceExtractor>,
    policy: UrlPolicy,
    pipeline: PublishPipeline,
    batch_size: usize,
    idle_poll: Duration,
}

impl CrawlWorker {
    pub fn new(
        worker_id: impl Into<String>,
        frontier: Frontier,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ResourceExtractor>,
        policy: UrlPolicy,
        pipeline: PublishPipeline,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            frontier,
            fetcher,
            extractor,
            policy,
            pipeline,
            batch_size: 10,
            idle_poll: Duration::from_secs(1),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until `shutdown` flips to true
    ///
    /// Shutdown is honoured between URLs. URLs of the current batch that
    /// were not started are pushed back to the global queue.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerSummary {
        tracing::info!(worker_id = %self.worker_id, "Worker started");
        let mut summary = WorkerSummary::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = match self.frontier.pop_batch(&self.worker_id, self.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(worker_id = %self.worker_id, error = %e, "Failed to pop batch");
                    Vec::new()
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_poll) => continue,
                    _ = shutdown.changed() => break,
                }
            }

            let mut remaining = batch.into_iter();
            for url in remaining.by_ref() {
                match self.process_url(&url).await {
                    Ok(outcome) => summary.record(&outcome),
                    Err(e) => {
                        summary.failed += 1;
                        tracing::warn!(worker_id = %self.worker_id, url = %url, error = %e, "Failed to process URL");
                    }
                }

                if *shutdown.borrow() {
                    break;
                }
            }

            let leftover: Vec<String> = remaining.collect();
            if !leftover.is_empty() {
                if let Err(e) = self.frontier.requeue(&leftover).await {
                    tracing::warn!(worker_id = %self.worker_id, error = %e, "Failed to requeue URLs");
                }
            }
        }

        tracing::info!(
            worker_id = %self.worker_id,
            processed = summary.processed,
            published = summary.published,
            "Worker stopped"
        );
        summary
    }

    /// Process one batch from the worker queue without waiting
    pub async fn process_batch(&self) -> Result<Vec<UrlOutcome>> {
        let batch = self
            .frontier
            .pop_batch(&self.worker_id, self.batch_size)
            .await?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for url in batch {
            outcomes.push(self.process_url(&url).await?);
        }
        Ok(outcomes)
    }

    /// Fetch, extract and publish one URL
    ///
    /// Store and index errors are returned. Fetch failures and skips are
    /// ordinary outcomes. A URL is marked visited only once its outcome is
    /// final; on an error it goes back to the global queue instead.
    pub async fn process_url(&self, url: &str) -> Result<UrlOutcome> {
        let fingerprint = Fingerprint::of(url);
        let dedup = self.frontier.dedup();

        if dedup.is_visited(&fingerprint).await? {
            tracing::debug!(url = %url, "Already visited");
            return Ok(self.finish(UrlOutcome::Skipped(SkipReason::Duplicate)));
        }

        let outcome = match self.crawl(url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(requeue_err) = self.frontier.requeue(&[url.to_string()]).await {
                    tracing::warn!(url = %url, error = %requeue_err, "Failed to requeue URL");
                }
                return Err(e);
            }
        };

        dedup.mark_visited(&fingerprint).await?;
        Ok(self.finish(outcome))
    }

    async fn crawl(&self, url: &str) -> Result<UrlOutcome> {
        let query = self.frontier.origin_query(url).await?;

        let page = match self.fetcher.fetch_page(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::info!(url = %url, error = %e, "Fetch failed");
                return Ok(UrlOutcome::Failed(e.to_string()));
            }
        };

        let extraction = self.extractor.extract(&page, query.as_deref());

        let followable: Vec<&String> = extraction
            .links
            .iter()
            .filter(|link| self.policy.should_follow(link))
            .collect();
        if !followable.is_empty() {
            let admitted = self
                .frontier
                .enqueue_all(followable, query.as_deref())
                .await?;
            tracing::debug!(url = %url, admitted, "Enqueued discovered links");
        }

        let Some(document) = extraction.resource else {
            tracing::debug!(url = %url, "No resource extracted");
            return Ok(UrlOutcome::Skipped(SkipReason::Extraction));
        };

        let report = self.pipeline.publish(&document, query.as_deref()).await?;
        Ok(UrlOutcome::Published(report))
    }

    fn finish(&self, outcome: UrlOutcome) -> UrlOutcome {
        metrics::record_url_outcome(outcome.as_str());
        outcome
    }
}
