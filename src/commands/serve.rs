use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;

use resgrep::config::Config;
use resgrep::crawler::CrawlTrigger;
use resgrep::streaming::{AppState, SessionManager, StreamServer};

use super::{init_metrics, open_index, shutdown_signal, Backends};

/// Run the streaming search server
pub async fn serve(mut config: Config, bind: Option<SocketAddr>) -> Result<()> {
    init_metrics();
    if let Some(bind) = bind {
        config.streaming.bind_address = bind;
    }

    let backends = Backends::connect(&config).await?;
    let index = open_index(&config).await?;
    let bus = backends.event_bus(&config)?;

    let trigger = CrawlTrigger::new(
        backends.frontier.clone(),
        backends.store.clone(),
        config.worker.seed_urls.clone(),
    );

    let state = AppState {
        index,
        bus,
        channels: backends.channels.clone(),
        store: backends.store.clone(),
        frontier: backends.frontier.clone(),
        trigger,
        sessions: SessionManager::new(),
        start_time: Instant::now(),
        config: config.streaming.clone(),
    };

    let server = StreamServer::new(state);
    println!("Streaming server listening on {}", server.bind_address());
    println!("  Search:  ws://{}/ws/search?query=...", server.bind_address());
    println!("  Trigger: POST http://{}/api/crawl", server.bind_address());
    println!();

    server.start_with_shutdown(shutdown_signal()).await?;
    println!("Streaming server stopped.");
    Ok(())
}
