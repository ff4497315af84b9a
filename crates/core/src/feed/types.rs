//! Types for feed, calendar and search parsers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use crate::models::{FeedItem, Name};

/// Errors raised by parser plugins and the parser registry.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Missing setting '{key}' for parser {parser}")]
    MissingSetting { parser: String, key: String },

    #[error("Invalid setting '{key}' for parser {parser}: {reason}")]
    InvalidSetting {
        parser: String,
        key: String,
        reason: String,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ParserError {
    /// Maps a reqwest failure onto the transport variants.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ParserError::Timeout
        } else if e.is_connect() {
            ParserError::ConnectionFailed(e.to_string())
        } else {
            ParserError::Parse(e.to_string())
        }
    }
}

/// Source-specific key/value configuration for one parser instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParserSettings {
    values: BTreeMap<String, serde_json::Value>,
}

impl ParserSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Accepts integers and numeric strings (environment overrides are strings).
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.values.get(key)? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Accepts booleans and `"true"`/`"false"` strings.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn require_str(&self, parser: &str, key: &str) -> Result<&str, ParserError> {
        match self.values.get(key) {
            None => Err(ParserError::MissingSetting {
                parser: parser.to_string(),
                key: key.to_string(),
            }),
            Some(v) => v.as_str().ok_or_else(|| ParserError::InvalidSetting {
                parser: parser.to_string(),
                key: key.to_string(),
                reason: "expected a string".to_string(),
            }),
        }
    }

    pub fn require_u64(&self, parser: &str, key: &str) -> Result<u64, ParserError> {
        if !self.contains(key) {
            return Err(ParserError::MissingSetting {
                parser: parser.to_string(),
                key: key.to_string(),
            });
        }
        self.get_u64(key).ok_or_else(|| ParserError::InvalidSetting {
            parser: parser.to_string(),
            key: key.to_string(),
            reason: "expected an unsigned integer".to_string(),
        })
    }
}

/// A periodically polled source (RSS tracker, calendar).
#[async_trait]
pub trait FeedParser<T>: Send + Sync {
    /// Configured id of this parser instance, for logging.
    fn name(&self) -> &str;

    /// Fetches the current contents of the source.
    async fn fetch(&self) -> Result<Vec<T>, ParserError>;
}

/// An on-demand search source queried per episode.
#[async_trait]
pub trait SearchParser: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, name: &Name) -> Result<Vec<FeedItem>, ParserError>;
}

/// Subscriber receiving newly seen items from a feed scheduler.
///
/// Implementations handle their own failures; the scheduler isolates each
/// delivery so a panic only loses that one item.
#[async_trait]
pub trait ItemListener<T>: Send + Sync {
    async fn on_new_item(&self, item: T);

    /// Called when a parser fails during a poll.
    async fn on_error(&self, source: &str, error: &ParserError) {
        warn!(source = source, error = %error, "Parser failed");
    }
}
