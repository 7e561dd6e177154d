//! Prometheus metrics for the supervisor, crawl workers and streaming server
//!
//! This module provides metrics tracking for:
//! - Supervisor: running workers, spawns, exits
//! - Frontier and workers: admissions, duplicates, distribution, URL outcomes
//! - Publish pipeline: index writes and emitted events
//! - Streaming: active sessions and per-result delivery decisions
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for supervisor metrics
struct SupervisorMetrics {
    running_workers: Gauge,
    worker_spawns: Counter,
    worker_spawn_failures: Counter,
    worker_exits: CounterVec,
    frontier_pending: Gauge,
    frontier_seen: Gauge,
    frontier_visited: Gauge,
}

/// Container for crawl and publish metrics
struct CrawlMetrics {
    urls_enqueued: Counter,
    urls_duplicate: Counter,
    urls_distributed: Counter,
    url_outcomes: CounterVec,
    documents_published: CounterVec,
    events_published: CounterVec,
}

/// Container for streaming metrics
struct StreamMetrics {
    active_sessions: Gauge,
    results: CounterVec,
}

static SUPERVISOR_METRICS: OnceLock<SupervisorMetrics> = OnceLock::new();
static CRAWL_METRICS: OnceLock<CrawlMetrics> = OnceLock::new();
static STREAM_METRICS: OnceLock<StreamMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once. If registration fails the error is
/// returned and every recording function stays a no-op.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let supervisor = SupervisorMetrics {
        running_workers: register_gauge!(
            "resgrep_supervisor_running_workers",
            "Number of crawl workers currently tracked as running"
        )?,
        worker_spawns: register_counter!(
            "resgrep_supervisor_worker_spawns_total",
            "Total crawl workers launched"
        )?,
        worker_spawn_failures: register_counter!(
            "resgrep_supervisor_worker_spawn_failures_total",
            "Total failed attempts to launch a crawl worker"
        )?,
        worker_exits: register_counter_vec!(
            "resgrep_supervisor_worker_exits_total",
            "Total crawl workers reaped, by how they ended",
            &["kind"]
        )?,
        frontier_pending: register_gauge!(
            "resgrep_frontier_pending_urls",
            "URLs waiting in the global pending queue"
        )?,
        frontier_seen: register_gauge!(
            "resgrep_frontier_seen_urls",
            "Fingerprints ever admitted to the frontier"
        )?,
        frontier_visited: register_gauge!(
            "resgrep_frontier_visited_urls",
            "Fingerprints whose fetch has completed"
        )?,
    };

    let crawl = CrawlMetrics {
        urls_enqueued: register_counter!(
            "resgrep_frontier_enqueued_total",
            "Total URLs admitted to the frontier"
        )?,
        urls_duplicate: register_counter!(
            "resgrep_frontier_duplicates_total",
            "Total URLs rejected because they were already seen"
        )?,
        urls_distributed: register_counter!(
            "resgrep_frontier_distributed_total",
            "Total URLs moved from the global queue to worker queues"
        )?,
        url_outcomes: register_counter_vec!(
            "resgrep_worker_urls_total",
            "URLs processed by crawl workers, by outcome",
            &["outcome"]
        )?,
        documents_published: register_counter_vec!(
            "resgrep_publish_documents_total",
            "Documents written to the index, by outcome",
            &["outcome"]
        )?,
        events_published: register_counter_vec!(
            "resgrep_publish_events_total",
            "Real-time events published, by channel kind",
            &["channel"]
        )?,
    };

    let stream = StreamMetrics {
        active_sessions: register_gauge!(
            "resgrep_stream_active_sessions",
            "Streaming search sessions currently open"
        )?,
        results: register_counter_vec!(
            "resgrep_stream_results_total",
            "Results offered to streaming sessions, by source and decision",
            &["source", "decision"]
        )?,
    };

    SUPERVISOR_METRICS
        .set(supervisor)
        .map_err(|_| "Supervisor metrics already initialized")?;
    CRAWL_METRICS
        .set(crawl)
        .map_err(|_| "Crawl metrics already initialized")?;
    STREAM_METRICS
        .set(stream)
        .map_err(|_| "Stream metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SUPERVISOR_METRICS.get().is_some() && CRAWL_METRICS.get().is_some() && STREAM_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Set the running worker gauge
pub fn set_running_workers(count: usize) {
    if let Some(m) = SUPERVISOR_METRICS.get() {
        m.running_workers.set(count as f64);
    }
}

/// Record a worker launch attempt
pub fn record_worker_spawn(success: bool) {
    let Some(m) = SUPERVISOR_METRICS.get() else {
        return;
    };

    if success {
        m.worker_spawns.inc();
    } else {
        m.worker_spawn_failures.inc();
    }
}

/// Record a reaped worker (`exited` or `killed`)
pub fn record_worker_exit(kind: &str) {
    if let Some(m) = SUPERVISOR_METRICS.get() {
        m.worker_exits.with_label_values(&[kind]).inc();
    }
}

/// Update frontier gauges
pub fn update_frontier_stats(pending: usize, seen: usize, visited: usize) {
    let Some(m) = SUPERVISOR_METRICS.get() else {
        return;
    };

    m.frontier_pending.set(pending as f64);
    m.frontier_seen.set(seen as f64);
    m.frontier_visited.set(visited as f64);
}

/// Record a frontier admission decision
pub fn record_enqueue(admitted: bool) {
    let Some(m) = CRAWL_METRICS.get() else {
        return;
    };

    if admitted {
        m.urls_enqueued.inc();
    } else {
        m.urls_duplicate.inc();
    }
}

/// Record URLs moved to worker queues
pub fn record_distributed(count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = CRAWL_METRICS.get() {
        m.urls_distributed.inc_by(count as f64);
    }
}

/// Record the outcome of one URL processed by a worker
pub fn record_url_outcome(outcome: &str) {
    if let Some(m) = CRAWL_METRICS.get() {
        m.url_outcomes.with_label_values(&[outcome]).inc();
    }
}

/// Record an index write (`created` or `updated`)
pub fn record_document_published(outcome: &str) {
    if let Some(m) = CRAWL_METRICS.get() {
        m.documents_published.with_label_values(&[outcome]).inc();
    }
}

/// Record an event published on a channel kind (`query` or `global`)
pub fn record_event_published(channel: &str) {
    if let Some(m) = CRAWL_METRICS.get() {
        m.events_published.with_label_values(&[channel]).inc();
    }
}

/// Set the active session gauge
pub fn set_active_sessions(count: usize) {
    if let Some(m) = STREAM_METRICS.get() {
        m.active_sessions.set(count as f64);
    }
}

/// Record what a session did with an offered result
pub fn record_stream_result(source: &str, decision: &str) {
    if let Some(m) = STREAM_METRICS.get() {
        m.results.with_label_values(&[source, decision]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
