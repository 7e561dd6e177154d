//! Web crawling with rate limiting
//!
//! This module holds the crawl side of the system: the shared frontier, the
//! page fetcher, resource extraction and the worker loop that ties them to
//! the publish pipeline.

pub mod extract;
pub mod frontier;
pub mod trigger;
pub mod url;
pub mod worker;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::WorkerConfig;
use crate::error::{Error, ResgrepErrorTrait, Result};
use crate::utils::retry::{with_retry_if, RetryConfig};

pub use self::extract::{Extraction, HtmlExtractor, ResourceExtractor};
pub use self::frontier::{DistributeReport, Frontier, FrontierStats};
pub use self::trigger::{CrawlRequest, CrawlTrigger};
pub use self::url::UrlPolicy;
pub use self::worker::{CrawlWorker, SkipReason, UrlOutcome, WorkerSummary};

/// A fetched page body
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code
    pub status: u16,

    /// Decoded body
    pub body: String,
}

/// Fetches pages for crawl workers
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`. Non-success statuses are errors.
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage>;
}

/// Main crawler structure
pub struct Crawler {
    /// HTTP client
    client: Client,

    /// Rate limiter
    rate_limiter: Arc<
        RateLimiter<
            governor::state::direct::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,

    /// Concurrency semaphore
    semaphore: Arc<Semaphore>,

    /// Retry policy for transient failures
    retry: RetryConfig,
}

impl Crawler {
    /// Create a new crawler instance
    pub fn new(config: &WorkerConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .build()?;

        let rate = NonZeroU32::new(config.rate_limit as u32)
            .ok_or_else(|| Error::config("Invalid rate limit value"))?;
        let quota = Quota::per_second(rate);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));

        Ok(Self {
            client,
            rate_limiter,
            semaphore,
            retry: RetryConfig::with_delays(2, 500, 5_000),
        })
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch a URL once with rate limiting
    async fn fetch_once(&self, url: &str) -> Result<FetchedPage> {
        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::with_source("Failed to acquire semaphore permit", e))?;

        tracing::debug!(url = %url, "Fetching URL");

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for Crawler {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage> {
        with_retry_if(&self.retry, || self.fetch_once(url), |e| e.is_recoverable()).await
    }
}
