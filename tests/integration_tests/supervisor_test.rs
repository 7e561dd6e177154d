//! Worker pool supervision tests
//!
//! Uses real child processes (`sh`) as stand-in workers.

#![cfg(unix)]

use std::time::Duration;

use resgrep::supervisor::{Coordinator, ProcessLauncher, Supervisor, WorkerState};
use tokio::sync::watch;

use crate::common::TestBackends;

fn shell_launcher(script: &str) -> ProcessLauncher {
    ProcessLauncher::new("sh", vec!["-c".to_string(), script.to_string()])
}

#[tokio::test]
async fn test_exited_workers_are_replaced() {
    let mut supervisor = Supervisor::new(shell_launcher("exit 0"), 2);

    let first = supervisor.tick();
    assert_eq!(first.spawned.len(), 2);
    assert!(first.reaped.is_empty());

    let mut reaped = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while reaped.len() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "Workers were not reaped");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = supervisor.tick();
        reaped.extend(
            report
                .reaped
                .into_iter()
                .filter(|(id, _)| first.spawned.contains(id)),
        );
        assert_eq!(supervisor.worker_count(), 2);
    }

    assert!(reaped.iter().all(|(_, code)| *code == Some(0)));
    for (worker_id, _) in &reaped {
        assert!(supervisor.worker(worker_id).is_none());
    }

    supervisor.shutdown();
}

#[tokio::test]
async fn test_running_workers_are_kept_and_terminated_on_shutdown() {
    let mut supervisor = Supervisor::new(shell_launcher("sleep 30"), 3);

    let spawned = supervisor.tick().spawned;
    assert_eq!(spawned.len(), 3);

    let second = supervisor.tick();
    assert!(second.spawned.is_empty());
    assert!(second.reaped.is_empty());
    for worker_id in &spawned {
        assert_eq!(
            supervisor.worker(worker_id).map(|w| w.state),
            Some(WorkerState::Running)
        );
    }

    assert_eq!(supervisor.shutdown(), 3);
    assert_eq!(supervisor.worker_count(), 0);
}

#[tokio::test]
async fn test_missing_program_counts_as_spawn_failure() {
    let launcher = ProcessLauncher::new("/nonexistent/resgrep-worker", Vec::new());
    let mut supervisor = Supervisor::new(launcher, 2);

    let report = supervisor.tick();
    assert!(report.spawned.is_empty());
    assert_eq!(report.spawn_failures, 1);
    assert_eq!(supervisor.worker_count(), 0);
}

#[tokio::test]
async fn test_coordinator_distributes_seeds_to_live_workers() {
    let backends = TestBackends::new();
    let seeds: Vec<String> = (0..12)
        .map(|i| format!("https://realpython.com/tutorial-{i}/"))
        .collect();

    let mut coordinator = Coordinator::new(
        Supervisor::new(shell_launcher("sleep 30"), 2),
        backends.frontier.clone(),
        seeds,
        Duration::from_secs(3600),
    );

    assert_eq!(coordinator.bootstrap().await.unwrap(), Some(12));
    // A second bootstrap finds the frontier already used
    assert_eq!(coordinator.bootstrap().await.unwrap(), None);

    let tick = coordinator.tick().await.unwrap();
    let workers = coordinator.supervisor().active_worker_ids();
    assert_eq!(workers.len(), 2);
    assert_eq!(tick.distributed.moved, 12);
    assert!(tick
        .distributed
        .per_worker
        .keys()
        .all(|id| workers.contains(id)));
    assert_eq!(tick.stats.pending, 0);
    assert_eq!(tick.stats.assigned, 12);

    // Stopping the loop terminates the worker processes
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), coordinator.run(rx))
        .await
        .expect("Coordinator did not stop")
        .unwrap();
}
