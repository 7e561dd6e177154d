//! Integration tests module
//!
//! End-to-end tests for the resgrep crawl and streaming system. Fetches go
//! to a local mock HTTP server; the queue store, index and event bus are
//! the in-memory backends.

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
pub mod streaming_test;
pub mod supervisor_test;
