//! Link follow policy for crawl workers
//!
//! A discovered link is followed only when it looks like learning material
//! (its URL matches one of the relevance keywords) and its host belongs to
//! one of the allowed domains.

use regex::Regex;
use url::Url;

/// Keywords a followable URL must contain (case-insensitive)
const RELEVANCE_KEYWORDS: &[&str] = &[
    "tutorial",
    "guide",
    "doc",
    "example",
    "resource",
    "learn",
    "library",
    "framework",
    "tool",
    "cheatsheet",
    "python",
    "javascript",
    "react",
    "node",
    "web",
    "code",
    "programming",
    "develop",
];

/// Decides which discovered links enter the frontier
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    relevance: Regex,
    allowed_domains: Vec<String>,
}

impl UrlPolicy {
    /// Create a policy restricted to `allowed_domains`
    pub fn new<I, S>(allowed_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = format!("(?i){}", RELEVANCE_KEYWORDS.join("|"));
        Self {
            relevance: Regex::new(&pattern).expect("Invalid relevance pattern"),
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.into().to_lowercase())
                .collect(),
        }
    }

    /// Check whether `url` should be enqueued
    pub fn should_follow(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        if !self.relevance.is_match(url) {
            return false;
        }

        let Some(host) = parsed.host_str() else {
            return false;
        };

        self.is_allowed_host(host)
    }

    /// Host equals an allowed domain or is a subdomain of one
    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.allowed_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }

    /// Resolve `href` against the page URL, dropping the fragment
    pub fn resolve(base: &Url, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            return None;
        }

        let mut joined = base.join(href).ok()?;
        joined.set_fragment(None);
        Some(joined.to_string())
    }
}
