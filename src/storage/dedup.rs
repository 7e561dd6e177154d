//! Seen/visited fingerprint sets shared by all crawl processes
//!
//! `mark_seen` is the only admission gate for the frontier. It maps to a
//! single set-add on the backing store, so concurrent callers from several
//! worker processes never both observe "new" for the same fingerprint.

use std::sync::Arc;

use crate::error::Result;
use crate::models::Fingerprint;

use super::{QueueKeys, QueueStore};

// ============================================================================
// Dedup Store
// ============================================================================

/// Process-wide seen and visited sets
#[derive(Clone)]
pub struct DedupStore {
    store: Arc<dyn QueueStore>,
    keys: QueueKeys,
}

impl DedupStore {
    pub fn new(store: Arc<dyn QueueStore>, keys: QueueKeys) -> Self {
        Self { store, keys }
    }

    /// Atomically mark a fingerprint as seen. Returns true if newly marked.
    pub async fn mark_seen(&self, fingerprint: &Fingerprint) -> Result<bool> {
        self.store
            .set_add(&self.keys.seen(), fingerprint.as_str())
            .await
    }

    /// Mark a fingerprint as visited (fetch finished, success or terminal failure)
    pub async fn mark_visited(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.store
            .set_add(&self.keys.visited(), fingerprint.as_str())
            .await?;
        Ok(())
    }

    pub async fn is_visited(&self, fingerprint: &Fingerprint) -> Result<bool> {
        self.store
            .set_contains(&self.keys.visited(), fingerprint.as_str())
            .await
    }

    pub async fn seen_count(&self) -> Result<usize> {
        self.store.set_len(&self.keys.seen()).await
    }

    pub async fn visited_count(&self) -> Result<usize> {
        self.store.set_len(&self.keys.visited()).await
    }
}

// ============================================================================
// Tests
// ============================================================================
