//! Per-session result filter
//!
//! A filter is a set of `field = value` pairs supplied as a JSON object at
//! connect time. A result passes only if, for every pair, it explicitly
//! carries a value equal to the filter value, compared case-insensitively.
//! A result that lacks the field fails the filter. The `language` field
//! matches either the single `language` value or any of `languages`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::ResourceDocument;

use super::messages::StreamResult;

/// Values a result carries for a filter field
pub trait FilterFields {
    fn field_values(&self, field: &str) -> Vec<&str>;
}

impl FilterFields for StreamResult {
    fn field_values(&self, field: &str) -> Vec<&str> {
        match field {
            "language" | "languages" => self
                .language
                .iter()
                .map(String::as_str)
                .chain(self.languages.iter().map(String::as_str))
                .collect(),
            "type" => vec![self.resource_type.as_str()],
            "domain" => vec![self.domain.as_str()],
            "url" => vec![self.url.as_str()],
            _ => Vec::new(),
        }
    }
}

impl FilterFields for ResourceDocument {
    fn field_values(&self, field: &str) -> Vec<&str> {
        match field {
            "language" | "languages" => self.languages.iter().map(String::as_str).collect(),
            "type" => vec![self.resource_type.as_str()],
            "domain" => vec![self.domain.as_str()],
            "url" => vec![self.url.as_str()],
            "tags" => self.tags.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Exact-match filter over declared fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFilter {
    fields: BTreeMap<String, String>,
}

impl ResultFilter {
    /// Filter that accepts everything
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a `field = value` requirement
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields
                .insert(field.into(), value.trim().to_lowercase());
        }
        self
    }

    /// Parse the connect-time `filters` parameter
    ///
    /// Empty strings and nulls are ignored. Any other non-string value is
    /// a parse error.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::empty());
        }
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::parse(format!("Invalid filters: {e}")))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let object = match value {
            Value::Null => return Ok(Self::empty()),
            Value::Object(object) => object,
            other => {
                return Err(Error::parse(format!(
                    "Filters must be a JSON object, got {other}"
                )))
            }
        };

        let mut filter = Self::empty();
        for (field, value) in object {
            match value {
                Value::Null => {}
                Value::String(s) => filter = filter.with(field.clone(), s.clone()),
                other => {
                    return Err(Error::parse(format!(
                        "Filter '{field}' must be a string, got {other}"
                    )))
                }
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared `(field, lowercased value)` pairs
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check a result against every declared field
    pub fn matches<T: FilterFields + ?Sized>(&self, item: &T) -> bool {
        self.fields.iter().all(|(field, expected)| {
            item.field_values(field)
                .iter()
                .any(|actual| actual.to_lowercase() == *expected)
        })
    }
}
