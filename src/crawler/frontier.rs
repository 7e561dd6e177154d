//! URL frontier: admission, partitioning and per-worker queues
//!
//! URLs enter through [`Frontier::enqueue`], which admits a URL only when
//! its fingerprint is newly marked seen. The coordinator periodically calls
//! [`Frontier::distribute`] to move a bounded batch from the global queue
//! into one queue per active worker, chosen by a stable hash of the URL.
//!
//! Distribution reads the head of the global queue, pushes every URL to its
//! worker queue and only then trims the batch off the global queue. A crash
//! between the push and the trim re-delivers the batch on the next tick;
//! nothing is lost.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::metrics;
use crate::models::Fingerprint;
use crate::storage::{DedupStore, QueueKeys, QueueStore};
use crate::utils::normalize_query;

// ============================================================================
// Partitioning
// ============================================================================

/// Index of the worker that owns `url` among `worker_count` workers
///
/// First 8 bytes (big-endian) of SHA-256 over the raw URL, modulo the
/// worker count. Returns 0 when `worker_count` is 0.
pub fn partition_index(url: &str, worker_count: usize) -> usize {
    if worker_count == 0 {
        return 0;
    }
    let digest = Sha256::digest(url.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % worker_count as u64) as usize
}

/// Worker id owning `url` given a sorted set of active worker ids
pub fn assign_worker<'a>(url: &str, sorted_worker_ids: &'a [String]) -> Option<&'a str> {
    if sorted_worker_ids.is_empty() {
        return None;
    }
    let idx = partition_index(url, sorted_worker_ids.len());
    Some(sorted_worker_ids[idx].as_str())
}

// ============================================================================
// Reports
// ============================================================================

/// Result of one distribution pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistributeReport {
    /// URLs moved out of the global queue
    pub moved: usize,

    /// URLs pushed to each worker queue
    pub per_worker: BTreeMap<String, usize>,
}

/// Frontier counters reported every supervisor tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontierStats {
    /// Fingerprints whose fetch has completed
    pub visited: usize,

    /// URLs waiting in the global queue
    pub pending: usize,

    /// URLs already assigned to worker queues but not yet popped
    pub assigned: usize,

    /// Fingerprints ever admitted
    pub seen: usize,
}

// ============================================================================
// Frontier
// ============================================================================

/// Shared crawl frontier
#[derive(Clone)]
pub struct Frontier {
    store: Arc<dyn QueueStore>,
    dedup: DedupStore,
    keys: QueueKeys,
    distribute_batch: usize,
}

impl Frontier {
    pub fn new(store: Arc<dyn QueueStore>, keys: QueueKeys, distribute_batch: usize) -> Self {
        let dedup = DedupStore::new(Arc::clone(&store), keys.clone());
        Self {
            store,
            dedup,
            keys,
            distribute_batch: distribute_batch.max(1),
        }
    }

    /// Dedup sets backing this frontier
    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Admit a URL to the global queue. Returns false if it was already seen.
    pub async fn enqueue(&self, url: &str) -> Result<bool> {
        self.enqueue_with_query(url, None).await
    }

    /// Admit a URL and remember the query of the crawl run that found it
    ///
    /// The query is recorded before the URL becomes visible to workers. If a
    /// query is already recorded for the fingerprint it is kept.
    pub async fn enqueue_with_query(&self, url: &str, query: Option<&str>) -> Result<bool> {
        let fingerprint = Fingerprint::of(url);

        if !self.dedup.mark_seen(&fingerprint).await? {
            tracing::trace!(url = %url, "Skipping already seen URL");
            metrics::record_enqueue(false);
            return Ok(false);
        }

        if let Some(query) = query.map(normalize_query).filter(|q| !q.is_empty()) {
            self.store
                .hash_set_if_absent(&self.keys.url_queries(), fingerprint.as_str(), &query)
                .await?;
        }

        self.store
            .list_push(&self.keys.pending(), &[url.to_string()])
            .await?;
        metrics::record_enqueue(true);
        Ok(true)
    }

    /// Admit several URLs, returning how many were new
    pub async fn enqueue_all<I, S>(&self, urls: I, query: Option<&str>) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut admitted = 0;
        for url in urls {
            if self.enqueue_with_query(url.as_ref(), query).await? {
                admitted += 1;
            }
        }
        Ok(admitted)
    }

    /// Move up to one batch from the global queue to worker queues
    ///
    /// Worker ids are sorted first so the assignment depends only on the
    /// set of active workers. With no active workers this is a no-op.
    pub async fn distribute(&self, active_worker_ids: &[String]) -> Result<DistributeReport> {
        if active_worker_ids.is_empty() {
            return Ok(DistributeReport::default());
        }

        let mut worker_ids = active_worker_ids.to_vec();
        worker_ids.sort();
        worker_ids.dedup();

        let batch = self
            .store
            .list_range(&self.keys.pending(), self.distribute_batch)
            .await?;
        if batch.is_empty() {
            return Ok(DistributeReport::default());
        }

        let mut assignments: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for url in &batch {
            if let Some(worker_id) = assign_worker(url, &worker_ids) {
                assignments
                    .entry(worker_id.to_string())
                    .or_default()
                    .push(url.clone());
            }
        }

        let mut report = DistributeReport::default();
        for (worker_id, urls) in assignments {
            self.store
                .list_push(&self.keys.worker_queue(&worker_id), &urls)
                .await?;
            report.per_worker.insert(worker_id, urls.len());
        }

        self.store
            .list_trim_front(&self.keys.pending(), batch.len())
            .await?;
        report.moved = batch.len();

        metrics::record_distributed(report.moved);
        tracing::debug!(moved = report.moved, workers = worker_ids.len(), "Distributed URLs");
        Ok(report)
    }

    /// Pop up to `count` URLs from a worker's own queue, in arrival order
    pub async fn pop_batch(&self, worker_id: &str, count: usize) -> Result<Vec<String>> {
        self.store
            .list_pop_front(&self.keys.worker_queue(worker_id), count)
            .await
    }

    /// Return already admitted URLs to the global queue without a seen check
    pub async fn requeue(&self, urls: &[String]) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        self.store.list_push(&self.keys.pending(), urls).await?;
        Ok(())
    }

    /// Query of the crawl run that admitted `url`, if any
    pub async fn origin_query(&self, url: &str) -> Result<Option<String>> {
        let fingerprint = Fingerprint::of(url);
        self.store
            .hash_get(&self.keys.url_queries(), fingerprint.as_str())
            .await
    }

    /// Enqueue `seeds` when nothing is pending and nothing was ever seen
    ///
    /// Returns the number of seeds admitted, or `None` if the frontier was
    /// not empty.
    pub async fn seed_if_empty(&self, seeds: &[String]) -> Result<Option<usize>> {
        let pending = self.store.list_len(&self.keys.pending()).await?;
        let seen = self.dedup.seen_count().await?;
        if pending > 0 || seen > 0 {
            return Ok(None);
        }

        let admitted = self.enqueue_all(seeds, None).await?;
        tracing::info!(seeds = admitted, "Seeded empty frontier");
        Ok(Some(admitted))
    }

    /// Current counters. `worker_ids` selects which worker queues count as assigned.
    pub async fn stats(&self, worker_ids: &[String]) -> Result<FrontierStats> {
        let mut assigned = 0;
        for worker_id in worker_ids {
            assigned += self
                .store
                .list_len(&self.keys.worker_queue(worker_id))
                .await?;
        }

        Ok(FrontierStats {
            visited: self.dedup.visited_count().await?,
            pending: self.store.list_len(&self.keys.pending()).await?,
            assigned,
            seen: self.dedup.seen_count().await?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
