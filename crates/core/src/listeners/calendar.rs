//! Listener for calendar feeds: announces which episodes are wanted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::backfill::BackfillManager;
use crate::feed::ItemListener;
use crate::models::{Episode, FeedItem};
use crate::naming::EpisodeNameParser;
use crate::store::ShowStore;

/// Records calendar entries as DESIRED episodes and asks the backfill loop
/// to search for each newly wanted episode right away.
///
/// Existing records are never touched, so an episode already in the library
/// stays EXISTS.
pub struct CalendarListener {
    parser: Arc<EpisodeNameParser>,
    shows: Arc<dyn ShowStore>,
    backfill: Option<Arc<BackfillManager>>,
}

impl CalendarListener {
    pub fn new(parser: Arc<EpisodeNameParser>, shows: Arc<dyn ShowStore>) -> Self {
        Self {
            parser,
            shows,
            backfill: None,
        }
    }

    pub fn with_backfill(mut self, backfill: Arc<BackfillManager>) -> Self {
        self.backfill = Some(backfill);
        self
    }
}

#[async_trait]
impl ItemListener<FeedItem> for CalendarListener {
    async fn on_new_item(&self, item: FeedItem) {
        let Some(parsed) = self.parser.parse(&item.title) else {
            debug!(source = %item.source_id, title = %item.title, "Could not parse calendar entry");
            return;
        };
        let name = parsed.name;

        match self.shows.insert_if_absent(&Episode::desired(name.clone())) {
            Ok(true) => info!(name = %name, "Episode now desired"),
            Ok(false) => {
                debug!(name = %name, "Episode already known");
                return;
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to record desired episode");
                return;
            }
        }

        if let Some(backfill) = &self.backfill {
            backfill.search_episode(&name).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::BackfillConfig;
    use crate::models::{Name, State};
    use crate::testing::{fixtures, MockSearchParser, RecordingListener};
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_entry_becomes_desired_and_searched() {
        let store = fixtures::store();
        let backfill = Arc::new(BackfillManager::new(
            BackfillConfig::new(Duration::from_secs(3600)),
            store.clone(),
            store.clone(),
        ));
        let search = Arc::new(MockSearchParser::new("search"));
        backfill.add_parser(search.clone()).await;

        let listener = CalendarListener::new(Arc::new(EpisodeNameParser::default()), store.clone())
            .with_backfill(backfill);
        listener
            .on_new_item(fixtures::feed_item("c1", "House S03E02"))
            .await;

        let name = Name::new("house", 3, 2);
        let episode = store.get(&name).unwrap().unwrap();
        assert_eq!(episode.state, State::Desired);
        assert_eq!(search.searches().await, vec![name]);
    }

    #[tokio::test]
    async fn test_existing_episode_not_demoted() {
        let store = fixtures::store();
        let name = Name::new("house", 3, 2);
        store.upsert(&Episode::existing(name.clone())).unwrap();

        let listener = CalendarListener::new(Arc::new(EpisodeNameParser::default()), store.clone());
        listener
            .on_new_item(fixtures::feed_item("c1", "House S03E02"))
            .await;

        assert_eq!(store.get(&name).unwrap().unwrap().state, State::Exists);
    }

    #[tokio::test]
    async fn test_known_episode_not_searched_again() {
        let store = fixtures::store();
        let name = Name::new("house", 3, 2);
        fixtures::desire(&store, &name);
        let backfill = Arc::new(BackfillManager::new(
            BackfillConfig::new(Duration::from_secs(3600)),
            store.clone(),
            store.clone(),
        ));
        let search = Arc::new(MockSearchParser::new("search"));
        backfill.add_parser(search.clone()).await;
        backfill
            .add_listener(Arc::new(RecordingListener::<FeedItem>::new()))
            .await;

        let listener = CalendarListener::new(Arc::new(EpisodeNameParser::default()), store.clone())
            .with_backfill(backfill);
        listener
            .on_new_item(fixtures::feed_item("c1", "House S03E02"))
            .await;

        assert!(search.searches().await.is_empty());
    }
}
