//! Generic RSS/Atom feed parser.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::models::FeedItem;

use super::types::{FeedParser, ParserError, ParserSettings};

/// Fetches an RSS or Atom document and turns each entry into a [`FeedItem`].
pub struct RssParser {
    id: String,
    url: String,
    client: Client,
}

impl RssParser {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ParserError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParserError::ConnectionFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            id: id.into(),
            url: url.into(),
            client,
        })
    }

    /// Settings: `url` (required).
    pub fn from_settings(
        id: &str,
        settings: &ParserSettings,
        timeout: Duration,
    ) -> Result<Self, ParserError> {
        let url = settings.require_str(id, "url")?;
        Self::new(id, url, timeout)
    }
}

#[async_trait]
impl FeedParser<FeedItem> for RssParser {
    fn name(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, ParserError> {
        let response = self
            .client
            .get(&self.url)
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

        let body = response.bytes().await.map_err(ParserError::from_reqwest)?;
        let items = parse_feed(&self.id, &body)?;
        debug!(source = %self.id, entries = items.len(), "Parsed feed");
        Ok(items)
    }
}

/// Parses a feed document. Entries without any link are skipped.
///
/// The enclosure URL is preferred over the entry link, since torrent
/// trackers put the `.torrent` location there.
pub(crate) fn parse_feed(source_id: &str, body: &[u8]) -> Result<Vec<FeedItem>, ParserError> {
    let feed = feed_rs::parser::parse(body).map_err(|e| ParserError::Parse(e.to_string()))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry
                .media
                .first()
                .and_then(|m| m.content.first())
                .and_then(|c| c.url.as_ref())
                .map(|u| u.to_string())
                .or_else(|| entry.links.first().map(|l| l.href.clone()))?;

            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let id = if entry.id.trim().is_empty() {
                link.clone()
            } else {
                entry.id
            };

            let item = FeedItem::new(id, title, link, source_id);
            Some(match entry.published.or(entry.updated) {
                Some(published) => item.with_published_at(published),
                None => item,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Tracker</title>
    <item>
      <title>House.S03E01.720p.HDTV.x264</title>
      <link>http://tracker.example/details/1</link>
      <guid>tracker-1</guid>
      <pubDate>Tue, 03 Oct 2006 20:00:00 GMT</pubDate>
      <enclosure url="http://tracker.example/download/1.torrent" length="1000" type="application/x-bittorrent"/>
    </item>
    <item>
      <title>House.S03E02.HDTV.x264</title>
      <link>http://tracker.example/details/2</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_entries() {
        let items = parse_feed("tracker", RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "House.S03E01.720p.HDTV.x264");
        assert_eq!(first.link, "http://tracker.example/download/1.torrent");
        assert_eq!(first.source_id, "tracker");
        assert!(first.published_at.is_some());

        let second = &items[1];
        assert_eq!(second.link, "http://tracker.example/details/2");
        assert!(!second.id.is_empty());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_parse_garbage_fails() {
        let err = parse_feed("tracker", b"not a feed").unwrap_err();
        assert!(matches!(err, ParserError::Parse(_)));
    }

    #[test]
    fn test_from_settings_requires_url() {
        let result = RssParser::from_settings("eztv", &ParserSettings::new(), Duration::from_secs(5));
        assert!(matches!(result, Err(ParserError::MissingSetting { .. })));
    }
}
