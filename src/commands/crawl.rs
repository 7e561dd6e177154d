use anyhow::Result;

use resgrep::config::Config;
use resgrep::crawler::{CrawlRequest, CrawlTrigger};

use super::Backends;

/// Trigger a crawl from the command line
pub async fn crawl(config: Config, urls: Vec<String>, query: Option<String>) -> Result<()> {
    let backends = Backends::connect(&config).await?;
    let trigger = CrawlTrigger::new(
        backends.frontier.clone(),
        backends.store.clone(),
        config.worker.seed_urls.clone(),
    );

    let job = trigger.trigger(CrawlRequest { urls, query }).await?;

    println!("Crawl job {}", job.job_id);
    println!("  Query:    {}", job.query.as_deref().unwrap_or("-"));
    println!("  Seeds:    {}", job.seeds.len());
    println!("  Enqueued: {}", job.enqueued);
    Ok(())
}

/// Print frontier counters
pub async fn stats(config: Config) -> Result<()> {
    let backends = Backends::connect(&config).await?;
    let stats = backends.frontier.stats(&[]).await?;

    println!("Frontier Statistics");
    println!("===================");
    println!("Pending: {}", stats.pending);
    println!("Seen:    {}", stats.seen);
    println!(
        "Visited: {} ({:.1}% of seen)",
        stats.visited,
        if stats.seen > 0 {
            stats.visited as f64 / stats.seen as f64 * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
