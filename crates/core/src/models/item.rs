use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Name, NameAndQuality, Quality};

/// Natural identity used to deduplicate feed output.
pub trait Identified {
    fn identity(&self) -> &str;
}

/// Raw entry produced by a feed, calendar or search parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Source-provided unique id (guid), or the link when the source has none.
    pub id: String,
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Configured id of the parser that produced the item.
    pub source_id: String,
}

impl FeedItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
            published_at: None,
            source_id: source_id.into(),
        }
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

impl Identified for FeedItem {
    fn identity(&self) -> &str {
        &self.id
    }
}

/// A feed item resolved to an episode identity and quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredItem {
    pub name: Name,
    pub quality: Quality,
    pub link: String,
    pub discovered_at: DateTime<Utc>,
    pub source_id: String,
}

impl DiscoveredItem {
    pub fn from_feed_item(
        item: &FeedItem,
        parsed: NameAndQuality,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: parsed.name,
            quality: parsed.quality,
            link: item.link.clone(),
            discovered_at,
            source_id: item.source_id.clone(),
        }
    }
}
