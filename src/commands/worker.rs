use std::sync::Arc;

use anyhow::Result;

use resgrep::config::Config;
use resgrep::crawler::{CrawlWorker, Crawler, HtmlExtractor, UrlPolicy};
use resgrep::publish::PublishPipeline;

use super::{init_metrics, open_index, shutdown_channel, Backends};

/// Run one crawl worker until signalled
pub async fn worker(config: Config, worker_id: String) -> Result<()> {
    init_metrics();
    let backends = Backends::connect(&config).await?;
    let index = open_index(&config).await?;
    let bus = backends.event_bus(&config)?;

    let fetcher = Crawler::new(&config.worker, config.request_timeout())?;
    let pipeline = PublishPipeline::new(index, bus, backends.channels.clone());

    let worker = CrawlWorker::new(
        worker_id,
        backends.frontier.clone(),
        Arc::new(fetcher),
        Arc::new(HtmlExtractor::new()),
        UrlPolicy::new(config.worker.allowed_domains.iter().cloned()),
        pipeline,
    )
    .with_batch_size(config.worker.batch_size)
    .with_idle_poll(config.idle_poll_interval());

    let summary = worker.run(shutdown_channel()).await;
    tracing::info!(
        worker_id = %worker.worker_id(),
        processed = summary.processed,
        published = summary.published,
        skipped = summary.skipped,
        failed = summary.failed,
        "Worker exiting"
    );
    Ok(())
}
