//! Listener that turns feed items into downloads.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, trace, warn};

use crate::arbiter::{QualityArbiter, RejectReason, Verdict};
use crate::download::DownloadTrigger;
use crate::feed::ItemListener;
use crate::models::{DiscoveredItem, FeedItem};
use crate::naming::EpisodeNameParser;

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Title did not parse into an episode identity.
    Unparsed,
    Rejected(RejectReason),
    /// Accepted and handed to the download trigger.
    Downloaded,
    /// Accepted, but the trigger failed. The acceptance stands.
    DownloadFailed,
    /// The arbiter could not reach the store.
    StoreFailed,
}

/// Feeds items through the quality arbiter and triggers downloads for the
/// accepted ones. Used for both tracker feeds and backfill search results.
pub struct DownloadableItemListener {
    parser: Arc<EpisodeNameParser>,
    arbiter: Arc<QualityArbiter>,
    trigger: Arc<dyn DownloadTrigger>,
}

impl DownloadableItemListener {
    pub fn new(
        parser: Arc<EpisodeNameParser>,
        arbiter: Arc<QualityArbiter>,
        trigger: Arc<dyn DownloadTrigger>,
    ) -> Self {
        Self {
            parser,
            arbiter,
            trigger,
        }
    }

    pub async fn process(&self, item: &FeedItem) -> ItemOutcome {
        let Some(parsed) = self.parser.parse(&item.title) else {
            debug!(source = %item.source_id, title = %item.title, "Could not parse item title");
            return ItemOutcome::Unparsed;
        };
        let discovered = DiscoveredItem::from_feed_item(item, parsed, Utc::now());

        let verdict = match self.arbiter.consider(
            &discovered.name,
            &discovered.quality,
            discovered.discovered_at,
        ) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(name = %discovered.name, error = %e, "Quality check failed");
                return ItemOutcome::StoreFailed;
            }
        };

        if let Verdict::Rejected(reason) = verdict {
            trace!(name = %discovered.name, reason = %reason, "Item dropped");
            return ItemOutcome::Rejected(reason);
        }

        match self.trigger.fetch(&discovered.link).await {
            Ok(()) => ItemOutcome::Downloaded,
            Err(e) => {
                warn!(
                    name = %discovered.name,
                    source = %discovered.source_id,
                    link = %discovered.link,
                    error = %e,
                    "Download trigger failed"
                );
                ItemOutcome::DownloadFailed
            }
        }
    }
}

#[async_trait]
impl ItemListener<FeedItem> for DownloadableItemListener {
    async fn on_new_item(&self, item: FeedItem) {
        self.process(&item).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Name;
    use crate::store::SqliteStore;
    use crate::testing::{fixtures, MockDownloadTrigger};
    use std::time::Duration;

    struct Fixture {
        store: Arc<SqliteStore>,
        trigger: Arc<MockDownloadTrigger>,
        listener: DownloadableItemListener,
    }

    fn setup(trigger: MockDownloadTrigger) -> Fixture {
        let store = fixtures::store();
        let arbiter = fixtures::arbiter(&store, &["1080p"], &["720p"], Duration::from_secs(1800));
        let trigger = Arc::new(trigger);
        let listener = DownloadableItemListener::new(
            Arc::new(EpisodeNameParser::default()),
            arbiter,
            trigger.clone(),
        );
        Fixture {
            store,
            trigger,
            listener,
        }
    }

    #[tokio::test]
    async fn test_primary_quality_triggers_download() {
        let f = setup(MockDownloadTrigger::new());
        fixtures::desire(&f.store, &Name::new("house", 3, 1));

        let item = fixtures::feed_item("a", "House.S03E01.1080p.WEB");
        assert_eq!(f.listener.process(&item).await, ItemOutcome::Downloaded);
        assert_eq!(f.trigger.links().await, vec![item.link.clone()]);
    }

    #[tokio::test]
    async fn test_unparsable_title_dropped() {
        let f = setup(MockDownloadTrigger::new());
        let item = fixtures::feed_item("a", "Some random release");

        assert_eq!(f.listener.process(&item).await, ItemOutcome::Unparsed);
        assert!(f.trigger.links().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_does_not_download() {
        let f = setup(MockDownloadTrigger::new());
        fixtures::desire(&f.store, &Name::new("house", 3, 1));

        let early_secondary = fixtures::feed_item("a", "House.S03E01.720p");
        assert_eq!(
            f.listener.process(&early_secondary).await,
            ItemOutcome::Rejected(RejectReason::AwaitingPrimaryWindow)
        );

        let undesired = fixtures::feed_item("b", "Lost.S01E01.1080p");
        assert_eq!(
            f.listener.process(&undesired).await,
            ItemOutcome::Rejected(RejectReason::NotDesired)
        );
        assert!(f.trigger.links().await.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_failure_keeps_acceptance() {
        let f = setup(MockDownloadTrigger::failing());
        fixtures::desire(&f.store, &Name::new("house", 3, 1));

        let first = fixtures::feed_item("a", "House.S03E01.1080p");
        assert_eq!(f.listener.process(&first).await, ItemOutcome::DownloadFailed);

        f.trigger.set_failing(false);
        let second = fixtures::feed_item("b", "House.S03E01.1080p.PROPER");
        assert_eq!(
            f.listener.process(&second).await,
            ItemOutcome::Rejected(RejectReason::AlreadyAccepted)
        );
    }
}
