//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

use regex::Regex;
use std::sync::OnceLock;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Canonical form of a search query: trimmed, lowercased, single-spaced
///
/// Used to name query-scoped event channels, so a crawl triggered for
/// `"React  Hooks"` reaches a session searching for `"react hooks"`.
pub fn normalize_query(query: &str) -> String {
    normalize_whitespace(query).to_lowercase()
}
