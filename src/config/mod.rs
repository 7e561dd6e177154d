//! Configuration management for resgrep
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every process role (coordinator, worker, serve)
//! reads the same structure and uses the sections it needs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Seed URLs used when the frontier is empty and no seeds were supplied
pub const DEFAULT_SEED_URLS: &[&str] = &[
    "https://github.com/topics/python",
    "https://stackoverflow.com/questions/tagged/python",
    "https://dev.to/t/python",
    "https://www.reddit.com/r/Python/",
    "https://www.geeksforgeeks.org/python-programming-language/",
    "https://realpython.com/tutorials/all/",
    "https://www.w3schools.com/python/",
    "https://docs.python.org/3/tutorial/",
    "https://reactjs.org/docs/getting-started.html",
    "https://github.com/topics/react",
    "https://stackoverflow.com/questions/tagged/reactjs",
    "https://dev.to/t/react",
    "https://www.reddit.com/r/reactjs/",
    "https://www.w3schools.com/react/",
    "https://reactjs.org/docs/hooks-intro.html",
    "https://reactjs.org/docs/hooks-overview.html",
    "https://reactjs.org/docs/hooks-state.html",
    "https://reactjs.org/docs/hooks-effect.html",
    "https://javascript.info/",
    "https://developer.mozilla.org/en-US/docs/Web/JavaScript",
    "https://www.w3schools.com/js/",
    "https://github.com/topics/programming",
    "https://news.ycombinator.com/",
    "https://dev.to/",
];

/// Domains whose links workers are allowed to follow
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "geeksforgeeks.org",
    "realpython.com",
    "python.org",
    "w3schools.com",
    "github.com",
];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Work queue storage (Redis)
    pub redis: RedisConfig,

    /// Document index (OpenSearch)
    pub opensearch: OpenSearchConfig,

    /// Worker pool supervisor
    pub supervisor: SupervisorConfig,

    /// Crawl worker behaviour
    pub worker: WorkerConfig,

    /// Streaming endpoint
    pub streaming: StreamingConfig,

    /// Event bus channel naming
    pub events: EventsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Key prefix for the frontier and dedup keys
    pub key_prefix: String,
}

/// OpenSearch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSearchConfig {
    /// OpenSearch endpoint URL
    pub url: String,

    /// Index name
    pub index_name: String,

    /// Username (optional)
    pub username: Option<String>,

    /// Password (optional)
    pub password: Option<String>,
}

/// Worker pool supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Desired number of running crawl workers
    pub workers: usize,

    /// Seconds between supervisor ticks
    pub tick_secs: u64,

    /// Maximum URLs moved from the global queue per tick
    pub distribute_batch: usize,

    /// Command used to launch a worker. The worker id is appended as
    /// `--worker-id <id>`. Defaults to the current executable's `worker`
    /// subcommand.
    pub worker_command: Option<Vec<String>>,
}

/// Crawl worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// URLs popped from the worker queue per batch
    pub batch_size: usize,

    /// Milliseconds to wait when the worker queue is empty
    pub idle_poll_ms: u64,

    /// Maximum number of concurrent requests
    pub max_concurrent_requests: usize,

    /// Rate limit (requests per second)
    pub rate_limit: f64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,

    /// Seeds used when the frontier starts empty
    pub seed_urls: Vec<String>,

    /// Domains whose links are followed
    pub allowed_domains: Vec<String>,
}

/// Streaming endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Address the HTTP/WebSocket server binds to
    pub bind_address: SocketAddr,

    /// Result cap for the bulk query
    pub bulk_result_size: usize,

    /// Seconds between keepalive checks on an idle connection
    pub keepalive_secs: u64,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Channel prefix, query channels are `<prefix>:<normalized query>`
    pub channel_prefix: String,

    /// Suffix of the always-on global channel
    pub global_channel: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.redis.url),
            pool_size: env_parse("REDIS_POOL_SIZE").unwrap_or(defaults.redis.pool_size),
            key_prefix: std::env::var("RESGREP_KEY_PREFIX").unwrap_or(defaults.redis.key_prefix),
        };

        let opensearch = OpenSearchConfig {
            url: std::env::var("OPENSEARCH_URL").unwrap_or(defaults.opensearch.url),
            index_name: std::env::var("OPENSEARCH_INDEX").unwrap_or(defaults.opensearch.index_name),
            username: std::env::var("OPENSEARCH_USERNAME").ok(),
            password: std::env::var("OPENSEARCH_PASSWORD").ok(),
        };

        let supervisor = SupervisorConfig {
            workers: env_parse("CRAWLER_WORKERS").unwrap_or(defaults.supervisor.workers),
            tick_secs: env_parse("SUPERVISOR_TICK_SECS").unwrap_or(defaults.supervisor.tick_secs),
            distribute_batch: env_parse("DISTRIBUTE_BATCH")
                .unwrap_or(defaults.supervisor.distribute_batch),
            worker_command: std::env::var("RESGREP_WORKER_COMMAND")
                .ok()
                .map(|v| v.split_whitespace().map(String::from).collect()),
        };

        let worker = WorkerConfig {
            batch_size: env_parse("WORKER_BATCH_SIZE").unwrap_or(defaults.worker.batch_size),
            idle_poll_ms: env_parse("WORKER_IDLE_POLL_MS").unwrap_or(defaults.worker.idle_poll_ms),
            max_concurrent_requests: env_parse("RESGREP_MAX_CONCURRENT_REQUESTS")
                .unwrap_or(defaults.worker.max_concurrent_requests),
            rate_limit: env_parse("RESGREP_RATE_LIMIT").unwrap_or(defaults.worker.rate_limit),
            request_timeout_secs: env_parse("RESGREP_REQUEST_TIMEOUT")
                .unwrap_or(defaults.worker.request_timeout_secs),
            user_agent: std::env::var("RESGREP_USER_AGENT").unwrap_or(defaults.worker.user_agent),
            seed_urls: env_list("RESGREP_SEED_URLS").unwrap_or(defaults.worker.seed_urls),
            allowed_domains: env_list("RESGREP_ALLOWED_DOMAINS")
                .unwrap_or(defaults.worker.allowed_domains),
        };

        let bind_address = match std::env::var("STREAM_BIND") {
            Ok(addr) => addr
                .parse()
                .with_context(|| format!("Invalid STREAM_BIND address: {addr}"))?,
            Err(_) => defaults.streaming.bind_address,
        };

        let streaming = StreamingConfig {
            bind_address,
            bulk_result_size: env_parse("BULK_RESULT_SIZE")
                .unwrap_or(defaults.streaming.bulk_result_size),
            keepalive_secs: env_parse("STREAM_KEEPALIVE_SECS")
                .unwrap_or(defaults.streaming.keepalive_secs),
            ..defaults.streaming
        };

        let events = EventsConfig {
            channel_prefix: std::env::var("RESGREP_CHANNEL_PREFIX")
                .unwrap_or(defaults.events.channel_prefix),
            ..defaults.events
        };

        let logging = LoggingConfig {
            level: std::env::var("RESGREP_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("RESGREP_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            redis,
            opensearch,
            supervisor,
            worker,
            streaming,
            events,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.supervisor.workers == 0 {
            anyhow::bail!("supervisor.workers must be greater than 0");
        }

        if self.supervisor.tick_secs == 0 {
            anyhow::bail!("supervisor.tick_secs must be greater than 0");
        }

        if self.supervisor.distribute_batch == 0 {
            anyhow::bail!("supervisor.distribute_batch must be greater than 0");
        }

        if self.worker.batch_size == 0 {
            anyhow::bail!("worker.batch_size must be greater than 0");
        }

        if self.worker.max_concurrent_requests == 0 {
            anyhow::bail!("worker.max_concurrent_requests must be greater than 0");
        }

        if self.worker.rate_limit < 1.0 {
            anyhow::bail!("worker.rate_limit must be at least 1 request per second");
        }

        if self.streaming.bulk_result_size == 0 {
            anyhow::bail!("streaming.bulk_result_size must be greater than 0");
        }

        if self.events.channel_prefix.trim().is_empty() {
            anyhow::bail!("events.channel_prefix must not be empty");
        }

        if self.redis.pool_size == 0 {
            anyhow::bail!("redis.pool_size must be greater than 0");
        }

        if let Some(command) = &self.supervisor.worker_command {
            if command.is_empty() {
                anyhow::bail!("supervisor.worker_command must name a program");
            }
        }

        Ok(())
    }

    /// Get supervisor tick interval as Duration
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.supervisor.tick_secs)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.request_timeout_secs)
    }

    /// Get worker idle poll interval as Duration
    #[must_use]
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.idle_poll_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            opensearch: OpenSearchConfig::default(),
            supervisor: SupervisorConfig::default(),
            worker: WorkerConfig::default(),
            streaming: StreamingConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://localhost:6379"),
            pool_size: 10,
            key_prefix: String::from("crawler"),
        }
    }
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:9200"),
            index_name: String::from("resources"),
            username: None,
            password: None,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            tick_secs: 5,
            distribute_batch: 100,
            worker_command: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_poll_ms: 1000,
            max_concurrent_requests: 16,
            rate_limit: 2.0,
            request_timeout_secs: 30,
            user_agent: format!("resgrep/{}", env!("CARGO_PKG_VERSION")),
            seed_urls: DEFAULT_SEED_URLS.iter().map(|s| s.to_string()).collect(),
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8001)),
            bulk_result_size: 100,
            keepalive_secs: 1,
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl StreamingConfig {
    /// Keepalive interval, never below one second
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_prefix: String::from("results"),
            global_channel: String::from("all"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
