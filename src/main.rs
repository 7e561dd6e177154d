mod commands;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resgrep::config::Config;

#[derive(Parser)]
#[command(
    name = "resgrep",
    version,
    about = "On-demand resource crawler with real-time streaming search",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML). Environment variables are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise crawl workers and distribute the frontier
    Coordinator {
        /// Desired number of workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Seconds between supervisor ticks
        #[arg(long)]
        tick_secs: Option<u64>,
    },

    /// Run one crawl worker (normally started by the coordinator)
    Worker {
        /// Worker identifier, selects the worker's queue
        #[arg(long)]
        worker_id: String,
    },

    /// Serve streaming search and the crawl API
    Serve {
        /// Bind address
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Trigger a crawl
    Crawl {
        /// Seed URL (repeatable). Default seeds are used when omitted.
        #[arg(short, long)]
        url: Vec<String>,

        /// Query of this crawl run
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Show frontier statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Coordinator { workers, tick_secs } => {
            if let Some(workers) = workers {
                config.supervisor.workers = workers;
            }
            if let Some(tick_secs) = tick_secs {
                config.supervisor.tick_secs = tick_secs;
            }
            config.validate()?;

            tracing::info!(
                workers = %config.supervisor.workers,
                tick_secs = %config.supervisor.tick_secs,
                "Starting coordinator command"
            );
            commands::coordinator(config, cli.config.as_deref()).await?;
        }

        Commands::Worker { worker_id } => {
            tracing::info!(worker_id = %worker_id, "Starting worker command");
            commands::worker(config, worker_id).await?;
        }

        Commands::Serve { bind } => {
            tracing::info!(bind = ?bind, "Starting serve command");
            commands::serve(config, bind).await?;
        }

        Commands::Crawl { url, query } => {
            tracing::info!(urls = url.len(), query = ?query, "Starting crawl command");
            commands::crawl(config, url, query).await?;
        }

        Commands::Stats => {
            commands::stats(config).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let default_directive = if verbose {
        "resgrep=debug,info".to_string()
    } else {
        format!("resgrep={level},warn")
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
