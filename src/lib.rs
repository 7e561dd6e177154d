//! resgrep - on-demand resource crawler with real-time streaming search
//!
//! A coordinator keeps a pool of crawl worker processes alive and hands
//! each of them a partition of a shared URL frontier. Workers fetch pages,
//! extract learning resources and publish them to a full-text index and a
//! real-time event bus. The streaming server answers a search with the
//! indexed results first and keeps pushing new matches as workers find them.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`storage`] - Work-queue storage and dedup sets (Redis)
//! - [`crawler`] - Frontier, fetcher, extraction and the worker loop
//! - [`publish`] - Document index (OpenSearch) and event bus (Redis pub/sub)
//! - [`supervisor`] - Worker pool supervision and the coordinator loop
//! - [`streaming`] - Streaming search sessions and the HTTP/WebSocket server
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use resgrep::crawler::Frontier;
//! use resgrep::storage::{MemoryStore, QueueKeys};
//!
//! #[tokio::main]
//! async fn main() -> resgrep::Result<()> {
//!     let frontier = Frontier::new(Arc::new(MemoryStore::new()), QueueKeys::default(), 100);
//!     frontier.enqueue("https://realpython.com/tutorials/all/").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod publish;
pub mod storage;
pub mod streaming;
pub mod supervisor;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{CrawlTrigger, CrawlWorker, Crawler, Frontier};
    pub use crate::error::{Error, ErrorCategory, ResgrepErrorTrait, Result};
    pub use crate::models::{CrawlJob, Fingerprint, RealtimeEvent, ResourceDocument, ResourceType};
    pub use crate::publish::{DocumentIndex, EventBus, PublishPipeline};
    pub use crate::streaming::{ResultFilter, SearchSession};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{Fingerprint, ResourceDocument, ResourceType};
