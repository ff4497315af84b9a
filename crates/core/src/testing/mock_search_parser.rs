//! Mock search parser for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::feed::{ParserError, SearchParser};
use crate::models::{FeedItem, Name};

/// Mock implementation of [`SearchParser`].
///
/// Results can be configured per episode; episodes without their own
/// results get the default set.
#[derive(Debug)]
pub struct MockSearchParser {
    name: String,
    default_results: RwLock<Vec<FeedItem>>,
    results_by_name: RwLock<HashMap<Name, Vec<FeedItem>>>,
    failing: RwLock<HashMap<Name, ParserError>>,
    searches: RwLock<Vec<Name>>,
}

impl MockSearchParser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_results: RwLock::new(Vec::new()),
            results_by_name: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashMap::new()),
            searches: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_results(&self, results: Vec<FeedItem>) {
        *self.default_results.write().await = results;
    }

    pub async fn set_results_for(&self, name: &Name, results: Vec<FeedItem>) {
        self.results_by_name
            .write()
            .await
            .insert(name.clone(), results);
    }

    /// Make the next search for `name` fail.
    pub async fn fail_for(&self, name: &Name, error: ParserError) {
        self.failing.write().await.insert(name.clone(), error);
    }

    /// Episodes searched so far, in call order.
    pub async fn searches(&self) -> Vec<Name> {
        self.searches.read().await.clone()
    }
}

#[async_trait]
impl SearchParser for MockSearchParser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, name: &Name) -> Result<Vec<FeedItem>, ParserError> {
        self.searches.write().await.push(name.clone());
        if let Some(error) = self.failing.write().await.remove(name) {
            return Err(error);
        }
        if let Some(results) = self.results_by_name.read().await.get(name) {
            return Ok(results.clone());
        }
        Ok(self.default_results.read().await.clone())
    }
}
