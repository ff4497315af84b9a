//! Jackett search parser used by the backfill loop.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::models::{FeedItem, Name};

use super::types::{ParserError, ParserSettings, SearchParser};

/// Jackett TV category.
const TV_CATEGORY: u32 = 5000;

/// Searches a Jackett instance for a single episode.
pub struct JackettSearchParser {
    id: String,
    url: String,
    api_key: String,
    indexer: String,
    client: Client,
}

impl JackettSearchParser {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        api_key: impl Into<String>,
        indexer: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ParserError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParserError::ConnectionFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            id: id.into(),
            url: url.into(),
            api_key: api_key.into(),
            indexer: indexer.into(),
            client,
        })
    }

    /// Settings: `url`, `api_key` (required), `indexer` (default `all`).
    pub fn from_settings(
        id: &str,
        settings: &ParserSettings,
        timeout: Duration,
    ) -> Result<Self, ParserError> {
        let url = settings.require_str(id, "url")?;
        let api_key = settings.require_str(id, "api_key")?;
        let indexer = settings.get_str("indexer").unwrap_or("all");
        Self::new(id, url, api_key, indexer, timeout)
    }

    /// Build the Jackett API URL for a search.
    fn build_search_url(&self, query: &str) -> String {
        format!(
            "{}/api/v2.0/indexers/{}/results?apikey={}&Query={}&Category[]={}",
            self.url.trim_end_matches('/'),
            urlencoding::encode(&self.indexer),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(query),
            TV_CATEGORY
        )
    }

    fn into_items(&self, response: JackettResponse) -> Vec<FeedItem> {
        response
            .Results
            .into_iter()
            .filter_map(|r| {
                let link = r.Link.or(r.MagnetUri)?;
                let id = r.Guid.unwrap_or_else(|| link.clone());
                let item = FeedItem::new(id, r.Title, link, self.id.as_str());
                Some(match r.PublishDate.and_then(|d| parse_jackett_date(&d)) {
                    Some(published) => item.with_published_at(published),
                    None => item,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SearchParser for JackettSearchParser {
    fn name(&self) -> &str {
        &self.id
    }

    async fn search(&self, name: &Name) -> Result<Vec<FeedItem>, ParserError> {
        let query = name.search_query();
        let url = self.build_search_url(&query);
        debug!(source = %self.id, query = %query, "Searching Jackett");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ParserError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ParserError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let jackett_response: JackettResponse = response
            .json()
            .await
            .map_err(|e| ParserError::Parse(format!("Failed to parse response: {}", e)))?;

        let items = self.into_items(jackett_response);
        debug!(source = %self.id, query = %query, results = items.len(), "Jackett search complete");
        Ok(items)
    }
}

/// Parse Jackett's date format.
fn parse_jackett_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

// Jackett API response types
#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResponse {
    Results: Vec<JackettResult>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResult {
    Title: String,
    Guid: Option<String>,
    Link: Option<String>,
    MagnetUri: Option<String>,
    PublishDate: Option<String>,
}
