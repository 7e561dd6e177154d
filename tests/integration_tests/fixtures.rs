//! Test fixtures for integration tests
//!
//! Provides sample HTML pages and helpers for wiring a worker to a mock server

use std::sync::Arc;
use std::time::Duration;

use resgrep::config::WorkerConfig;
use resgrep::crawler::{CrawlWorker, Crawler, HtmlExtractor, UrlPolicy};
use resgrep::utils::retry::RetryConfig;

use crate::common::TestBackends;

/// Tutorial page with code, a followable link and an off-site link
pub const TUTORIAL_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Python Decorators Tutorial</title>
    <meta name="description" content="Learn how python decorators wrap functions">
    <meta name="keywords" content="python, decorators">
</head>
<body>
    <article>
        <h1>Decorators</h1>
        <p>A decorator takes a function and returns a new one.</p>
        <pre><code>@timer
def work():
    pass</code></pre>
    </article>
    <a href="/python-guide">Next: the python guide</a>
    <a href="/about">About us</a>
    <a href="https://elsewhere.net/tutorial">Elsewhere</a>
</body>
</html>
"#;

/// Documentation page without a meta description
pub const DOCS_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <title>asyncio documentation</title>
</head>
<body>
    <div class="documentation">
        <p>asyncio is a library to write concurrent python code.</p>
        <p>It is used as a foundation for multiple frameworks.</p>
    </div>
</body>
</html>
"#;

/// Page that is not a learning resource
pub const PLAIN_PAGE_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <title>Company picnic photos</title>
</head>
<body>
    <p>Photos from this year's picnic.</p>
</body>
</html>
"#;

/// Broken markup the extractor must survive
pub const MALFORMED_HTML: &str = r#"
<html><head><title>Python tips</title>
<body><div><pre><code>print("unclosed"
<p>Broken <b>markup</div></p>
"#;

/// Worker `worker_1000` fetching through a real HTTP client
///
/// Only hosts in `allowed` are followed; retries use short delays.
pub fn http_worker(backends: &TestBackends, allowed: &[&str], retries: u32) -> CrawlWorker {
    let config = WorkerConfig {
        rate_limit: 50.0,
        ..WorkerConfig::default()
    };
    let crawler = Crawler::new(&config, Duration::from_secs(2))
        .unwrap()
        .with_retry(RetryConfig::with_delays(retries, 10, 50));

    CrawlWorker::new(
        "worker_1000",
        backends.frontier.clone(),
        Arc::new(crawler),
        Arc::new(HtmlExtractor::new()),
        UrlPolicy::new(allowed.iter().copied()),
        backends.pipeline(),
    )
    .with_idle_poll(Duration::from_millis(20))
}
