//! Parser registry: maps a configured source name to a constructor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::FeedItem;

use super::jackett::JackettSearchParser;
use super::rss::RssParser;
use super::types::{FeedParser, ParserError, ParserSettings, SearchParser};

/// Builds a feed parser from its instance id and settings.
pub type FeedParserFactory = Arc<
    dyn Fn(&str, &ParserSettings, Duration) -> Result<Arc<dyn FeedParser<FeedItem>>, ParserError>
        + Send
        + Sync,
>;

/// Builds a search parser from its instance id and settings.
pub type SearchParserFactory = Arc<
    dyn Fn(&str, &ParserSettings, Duration) -> Result<Arc<dyn SearchParser>, ParserError>
        + Send
        + Sync,
>;

/// Registry of parser constructors, populated at startup.
pub struct ParserRegistry {
    request_timeout: Duration,
    feeds: HashMap<String, FeedParserFactory>,
    searches: HashMap<String, SearchParserFactory>,
}

impl ParserRegistry {
    /// Empty registry.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            feeds: HashMap::new(),
            searches: HashMap::new(),
        }
    }

    /// Registry with the `rss` feed source and the `jackett` search source.
    pub fn with_builtins(request_timeout: Duration) -> Self {
        let mut registry = Self::new(request_timeout);
        registry.register_feed(
            "rss",
            Arc::new(|id: &str, settings: &ParserSettings, timeout: Duration| {
                Ok(Arc::new(RssParser::from_settings(id, settings, timeout)?)
                    as Arc<dyn FeedParser<FeedItem>>)
            }),
        );
        registry.register_search(
            "jackett",
            Arc::new(|id: &str, settings: &ParserSettings, timeout: Duration| {
                Ok(Arc::new(JackettSearchParser::from_settings(id, settings, timeout)?)
                    as Arc<dyn SearchParser>)
            }),
        );
        registry
    }

    pub fn register_feed(&mut self, source: impl Into<String>, factory: FeedParserFactory) {
        self.feeds.insert(source.into(), factory);
    }

    pub fn register_search(&mut self, source: impl Into<String>, factory: SearchParserFactory) {
        self.searches.insert(source.into(), factory);
    }

    pub fn create_feed(
        &self,
        source: &str,
        id: &str,
        settings: &ParserSettings,
    ) -> Result<Arc<dyn FeedParser<FeedItem>>, ParserError> {
        let factory = self
            .feeds
            .get(source)
            .ok_or_else(|| ParserError::UnknownSource(source.to_string()))?;
        factory(id, settings, self.request_timeout)
    }

    pub fn create_search(
        &self,
        source: &str,
        id: &str,
        settings: &ParserSettings,
    ) -> Result<Arc<dyn SearchParser>, ParserError> {
        let factory = self
            .searches
            .get(source)
            .ok_or_else(|| ParserError::UnknownSource(source.to_string()))?;
        factory(id, settings, self.request_timeout)
    }

    /// Registered feed source names, sorted.
    pub fn feed_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.feeds.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered search source names, sorted.
    pub fn search_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.searches.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
