//! Coordinator loop
//!
//! Runs the supervisor, the frontier distribution and the stats report on
//! one fixed tick. A failing tick (queue storage unreachable) is retried
//! with backoff; it never stops the loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::crawler::{DistributeReport, Frontier, FrontierStats};
use crate::error::Result;
use crate::metrics;
use crate::utils::retry::{with_retry, RetryConfig};

use super::{Supervisor, TickReport, WorkerLauncher};

/// Everything one coordinator tick did
#[derive(Debug, Clone, Default)]
pub struct CoordinatorTick {
    pub supervisor: TickReport,
    pub distributed: DistributeReport,
    pub stats: FrontierStats,
}

/// Supervisor plus frontier maintenance on a fixed interval
pub struct Coordinator<L: WorkerLauncher> {
    supervisor: Supervisor<L>,
    frontier: Frontier,
    seeds: Vec<String>,
    tick_interval: Duration,
    backoff: RetryConfig,
}

impl<L: WorkerLauncher> Coordinator<L> {
    pub fn new(
        supervisor: Supervisor<L>,
        frontier: Frontier,
        seeds: Vec<String>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            supervisor,
            frontier,
            seeds,
            tick_interval,
            backoff: RetryConfig::with_delays(5, 1_000, 60_000),
        }
    }

    pub fn supervisor(&self) -> &Supervisor<L> {
        &self.supervisor
    }

    /// Seed the frontier if it has never held anything
    pub async fn bootstrap(&self) -> Result<Option<usize>> {
        with_retry(&self.backoff, || self.frontier.seed_if_empty(&self.seeds)).await
    }

    /// One supervisor pass followed by distribution and stats
    pub async fn tick(&mut self) -> Result<CoordinatorTick> {
        let supervisor = self.supervisor.tick();
        let worker_ids = self.supervisor.active_worker_ids();

        let distributed = self.frontier.distribute(&worker_ids).await?;
        let stats = self.frontier.stats(&worker_ids).await?;

        metrics::update_frontier_stats(stats.pending, stats.seen, stats.visited);
        tracing::info!(
            workers = worker_ids.len(),
            pending = stats.pending,
            assigned = stats.assigned,
            seen = stats.seen,
            visited = stats.visited,
            moved = distributed.moved,
            "Crawl stats"
        );

        Ok(CoordinatorTick {
            supervisor,
            distributed,
            stats,
        })
    }

    /// Tick until `shutdown` flips, then terminate every worker
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        match self.bootstrap().await {
            Ok(Some(seeded)) => tracing::info!(seeded, "Frontier seeded with default URLs"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Could not seed frontier"),
        }

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(_) => failures = 0,
                        Err(e) => {
                            failures = failures.saturating_add(1);
                            let delay = self.backoff.calculate_delay(failures.min(self.backoff.max_retries));
                            tracing::warn!(error = %e, failures, delay_ms = delay.as_millis() as u64, "Coordinator tick failed");

                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = shutdown.changed() => break,
                            }
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        let terminated = self.supervisor.shutdown();
        tracing::info!(terminated, "Coordinator stopped");
        Ok(())
    }
}
