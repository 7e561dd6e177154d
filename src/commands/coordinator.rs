use std::path::Path;

use anyhow::Result;

use resgrep::config::{Config, DEFAULT_SEED_URLS};
use resgrep::supervisor::{Coordinator, ProcessLauncher, Supervisor};

use super::{init_metrics, shutdown_channel, Backends};

/// Run the supervisor and frontier distribution until signalled
pub async fn coordinator(mut config: Config, config_path: Option<&Path>) -> Result<()> {
    init_metrics();
    let backends = Backends::connect(&config).await?;

    let launcher = match &config.supervisor.worker_command {
        Some(command) => ProcessLauncher::from_command(command)?,
        None => {
            // Workers read the same config file as the coordinator
            let extra = config_path
                .map(|p| vec!["--config".to_string(), p.display().to_string()])
                .unwrap_or_default();
            ProcessLauncher::current_exe(extra)?
        }
    };

    if config.worker.seed_urls.is_empty() {
        config.worker.seed_urls = DEFAULT_SEED_URLS.iter().map(|s| s.to_string()).collect();
    }

    tracing::info!(
        workers = config.supervisor.workers,
        tick_secs = config.supervisor.tick_secs,
        command = ?launcher.command_line("<id>"),
        "Starting coordinator"
    );

    let supervisor = Supervisor::new(launcher, config.supervisor.workers);
    let coordinator = Coordinator::new(
        supervisor,
        backends.frontier.clone(),
        config.worker.seed_urls.clone(),
        config.tick_interval(),
    );

    coordinator.run(shutdown_channel()).await?;
    Ok(())
}
