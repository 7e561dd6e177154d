//! Shared work-queue storage
//!
//! The frontier and the dedup sets live in an external key-value service
//! shared by the coordinator and every worker process. Only list push/pop
//! and set add/membership primitives are used, each of which is atomic on
//! the server, so no read-modify-write races appear between processes.
//!
//! - [`QueueStore`] - the narrow storage interface
//! - [`redis::RedisStore`] - production backend over a `deadpool-redis` pool
//! - [`memory::MemoryStore`] - in-process backend for tests and dry runs
//! - [`dedup::DedupStore`] - seen/visited fingerprint sets

pub mod dedup;
pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::Result;

pub use self::dedup::DedupStore;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Atomic list, set and hash primitives over string keys
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add a member to a set. Returns true if it was not present before.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Check set membership
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool>;

    /// Number of members in a set
    async fn set_len(&self, key: &str) -> Result<usize>;

    /// Append values to the tail of a list, returning the new length
    async fn list_push(&self, key: &str, values: &[String]) -> Result<usize>;

    /// Read up to `count` values from the head of a list without removing them
    async fn list_range(&self, key: &str, count: usize) -> Result<Vec<String>>;

    /// Remove the first `count` values of a list
    async fn list_trim_front(&self, key: &str, count: usize) -> Result<()>;

    /// Remove and return up to `count` values from the head of a list
    async fn list_pop_front(&self, key: &str, count: usize) -> Result<Vec<String>>;

    /// Length of a list (0 if absent)
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Set a hash field unconditionally
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Set a hash field only if it is absent. Returns true if it was written.
    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool>;

    /// Read a hash field
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Check the backend is reachable
    async fn ping(&self) -> Result<()>;
}

/// Key layout of the shared frontier
#[derive(Debug, Clone)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Global pending queue
    pub fn pending(&self) -> String {
        format!("{}:pending_urls", self.prefix)
    }

    /// Pending queue owned by one worker
    pub fn worker_queue(&self, worker_id: &str) -> String {
        format!("{}:pending_urls:{}", self.prefix, worker_id)
    }

    /// Fingerprints ever admitted to the frontier
    pub fn seen(&self) -> String {
        format!("{}:seen_urls", self.prefix)
    }

    /// Fingerprints whose fetch has completed
    pub fn visited(&self) -> String {
        format!("{}:visited_urls", self.prefix)
    }

    /// Fingerprint to originating query
    pub fn url_queries(&self) -> String {
        format!("{}:url_queries", self.prefix)
    }

    /// Job id to crawl job record
    pub fn jobs(&self) -> String {
        format!("{}:jobs", self.prefix)
    }
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self::new("crawler")
    }
}
