//! Mock feed parser for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::feed::{FeedParser, ParserError};
use crate::models::FeedItem;

/// Mock implementation of [`FeedParser`].
///
/// Returns the configured items on every fetch, unless an error was queued
/// with [`fail_next`](Self::fail_next).
#[derive(Debug)]
pub struct MockFeedParser {
    name: String,
    items: RwLock<Vec<FeedItem>>,
    next_error: RwLock<Option<ParserError>>,
    fetches: AtomicUsize,
}

impl MockFeedParser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(Vec::new()),
            next_error: RwLock::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Set the items returned by subsequent fetches.
    pub async fn set_items(&self, items: Vec<FeedItem>) {
        *self.items.write().await = items;
    }

    /// Configure the next fetch to fail with the given error.
    pub async fn fail_next(&self, error: ParserError) {
        *self.next_error.write().await = Some(error);
    }

    /// Number of fetches performed, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedParser<FeedItem> for MockFeedParser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, ParserError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        Ok(self.items.read().await.clone())
    }
}
