//! Worker pool supervisor
//!
//! Keeps a configured number of crawl workers alive. Each tick polls every
//! tracked worker, forgets the ones that exited and spawns fresh workers
//! until the desired count is reached again. A worker crash is an ordinary
//! event here: it is logged and replaced on the next tick.
//!
//! Worker slot lifecycle:
//!
//! ```text
//! absent -> starting -> running -> (exited | killed) -> absent
//! ```

pub mod coordinator;
pub mod launcher;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::metrics;

pub use self::coordinator::{Coordinator, CoordinatorTick};
pub use self::launcher::{ProcessLauncher, WorkerLauncher, WorkerLiveness};

// ============================================================================
// Worker Records
// ============================================================================

/// State of a tracked worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Spawned, not yet observed running
    Starting,
    Running,
    Exited { code: Option<i32> },
    /// Terminated by the supervisor
    Killed,
}

/// A worker the supervisor tracks
#[derive(Debug)]
pub struct WorkerRecord<H> {
    pub worker_id: String,
    pub handle: H,
    pub state: WorkerState,
    pub started_at: DateTime<Utc>,
}

/// What one tick changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Workers found exited, with their exit code
    pub reaped: Vec<(String, Option<i32>)>,

    /// Ids of newly spawned workers
    pub spawned: Vec<String>,

    pub spawn_failures: usize,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Maintains the worker pool
pub struct Supervisor<L: WorkerLauncher> {
    launcher: L,
    desired: usize,
    workers: BTreeMap<String, WorkerRecord<L::Handle>>,
}

impl<L: WorkerLauncher> Supervisor<L> {
    pub fn new(launcher: L, desired: usize) -> Self {
        Self {
            launcher,
            desired,
            workers: BTreeMap::new(),
        }
    }

    pub fn desired(&self) -> usize {
        self.desired
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn launcher_mut(&mut self) -> &mut L {
        &mut self.launcher
    }

    /// Ids of every tracked worker, sorted
    pub fn active_worker_ids(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker(&self, worker_id: &str) -> Option<&WorkerRecord<L::Handle>> {
        self.workers.get(worker_id)
    }

    /// Reap exited workers, then top the pool back up
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for record in self.workers.values_mut() {
            match self.launcher.poll(&mut record.handle) {
                Ok(WorkerLiveness::Running) => {
                    if record.state == WorkerState::Starting {
                        record.state = WorkerState::Running;
                    }
                }
                Ok(WorkerLiveness::Exited(code)) => {
                    record.state = WorkerState::Exited { code };
                }
                Err(e) => {
                    tracing::warn!(worker_id = %record.worker_id, error = %e, "Failed to poll worker, terminating");
                    if let Err(e) = self.launcher.terminate(&mut record.handle) {
                        tracing::warn!(worker_id = %record.worker_id, error = %e, "Failed to terminate worker");
                    }
                    record.state = WorkerState::Killed;
                }
            }
        }

        let finished: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, r)| matches!(r.state, WorkerState::Exited { .. } | WorkerState::Killed))
            .map(|(id, _)| id.clone())
            .collect();

        for worker_id in finished {
            let Some(record) = self.workers.remove(&worker_id) else {
                continue;
            };
            match record.state {
                WorkerState::Exited { code } => {
                    tracing::info!(worker_id = %worker_id, exit_code = ?code, "Worker exited");
                    metrics::record_worker_exit("exited");
                    report.reaped.push((worker_id, code));
                }
                _ => {
                    metrics::record_worker_exit("killed");
                    report.reaped.push((worker_id, None));
                }
            }
        }

        while self.workers.len() < self.desired {
            let worker_id = self.next_worker_id();
            match self.launcher.spawn(&worker_id) {
                Ok(handle) => {
                    tracing::info!(worker_id = %worker_id, "Started worker");
                    metrics::record_worker_spawn(true);
                    self.workers.insert(
                        worker_id.clone(),
                        WorkerRecord {
                            worker_id: worker_id.clone(),
                            handle,
                            state: WorkerState::Starting,
                            started_at: Utc::now(),
                        },
                    );
                    report.spawned.push(worker_id);
                }
                Err(e) => {
                    // Retried on the next tick
                    tracing::warn!(worker_id = %worker_id, error = %e, "Failed to start worker");
                    metrics::record_worker_spawn(false);
                    report.spawn_failures += 1;
                    break;
                }
            }
        }

        metrics::set_running_workers(self.workers.len());
        report
    }

    /// Send terminate to every tracked worker and forget them
    ///
    /// Returns the number of workers signalled. Does not wait for exits.
    pub fn shutdown(&mut self) -> usize {
        let count = self.workers.len();
        for (worker_id, mut record) in std::mem::take(&mut self.workers) {
            if let Err(e) = self.launcher.terminate(&mut record.handle) {
                tracing::warn!(worker_id = %worker_id, error = %e, "Failed to terminate worker");
            }
            metrics::record_worker_exit("killed");
            tracing::info!(worker_id = %worker_id, "Terminated worker");
        }
        metrics::set_running_workers(0);
        count
    }

    /// `worker_NNNN`, unique among tracked workers
    fn next_worker_id(&self) -> String {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let candidate = format!("worker_{}", rng.gen_range(1000..=9999));
            if !self.workers.contains_key(&candidate) {
                return candidate;
            }
        }
        format!("worker_{}", uuid::Uuid::new_v4().simple())
    }
}
