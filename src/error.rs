//! Unified error handling for the resgrep crate
//!
//! This module provides a single `Error` enum shared by the frontier,
//! supervisor, publish pipeline and streaming session.
//!
//! # Architecture
//!
//! - [`ResgrepErrorTrait`] - Common interface implemented by the error type
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all collaborator errors
//!
//! Expected operational outcomes (duplicate URLs, pages without an
//! extractable resource, worker exits, client disconnects) are not errors
//! and never appear here. They are plain values on the types that produce
//! them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use resgrep::error::{Error, ResgrepErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(error = %err, "Retrying");
//!     } else {
//!         tracing::error!(error = %err, "Giving up");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Common trait for resgrep error types
pub trait ResgrepErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Work queue, event bus or index unreachable
    Connectivity,
    /// Malformed data (client messages, JSON payloads)
    Parsing,
    /// Page fetch failures
    Fetch,
    /// Configuration and validation errors
    Config,
    /// Streaming session failures
    Session,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Parsing => "parsing",
            Self::Fetch => "fetch",
            Self::Config => "config",
            Self::Session => "session",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the resgrep crate
#[derive(Error, Debug)]
pub enum Error {
    /// Redis command errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis connection pool errors
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Redis pool construction errors
    #[error("Redis pool setup error: {0}")]
    PoolSetup(#[from] deadpool_redis::CreatePoolError),

    /// OpenSearch transport errors
    #[error("OpenSearch error: {0}")]
    OpenSearch(#[from] opensearch::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Page fetch returned a non-success status
    #[error("Fetch failed for {url}: status {status}")]
    FetchStatus { url: String, status: u16 },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Malformed inbound client message or filter
    #[error("Parse error: {0}")]
    Parse(String),

    /// An external service answered with an unexpected response
    #[error("{service} unavailable: {message}")]
    Connectivity { service: &'static str, message: String },

    /// Streaming session failure
    #[error("Session error: {0}")]
    Session(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ResgrepErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Redis(_)
            | Self::Pool(_)
            | Self::OpenSearch(_)
            | Self::Connectivity { .. } => true,
            Self::Http(_) => true,
            Self::FetchStatus { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Io(_) => true,
            Self::PoolSetup(_) | Self::Json(_) | Self::Config(_) | Self::Parse(_) => false,
            Self::Session(_) | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Redis(_)
            | Self::Pool(_)
            | Self::PoolSetup(_)
            | Self::OpenSearch(_)
            | Self::Connectivity { .. } => ErrorCategory::Connectivity,
            Self::Http(_) | Self::FetchStatus { .. } => ErrorCategory::Fetch,
            Self::Json(_) | Self::Parse(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Session(_) => ErrorCategory::Session,
            Self::Io(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a client-message parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a connectivity error for a named service
    pub fn connectivity(service: &'static str, message: impl Into<String>) -> Self {
        Self::Connectivity {
            service,
            message: message.into(),
        }
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
