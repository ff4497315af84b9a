//! Backfill loop: on-demand search for desired episodes.
//!
//! Passive feeds only show what is currently being released. On each tick
//! this loop lists every DESIRED episode without an accepted quality decision
//! and asks each search parser for it. Results go to the same listeners as
//! feed items, so they pass through the quality arbiter like everything else.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::feed::{ItemListener, SearchParser};
use crate::lifecycle::{LifecycleError, Managed};
use crate::metrics;
use crate::models::{FeedItem, Name, State};
use crate::store::{QualityStore, ShowStore, StoreError};

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub interval: Duration,
    pub poll_immediately: bool,
    /// Episodes searched concurrently within one tick.
    pub max_concurrent_searches: usize,
}

impl BackfillConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            poll_immediately: true,
            max_concurrent_searches: 4,
        }
    }
}

/// Summary of one backfill tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub episodes: usize,
    pub items_found: usize,
    pub failed_searches: usize,
}

struct Shared {
    shows: Arc<dyn ShowStore>,
    decisions: Arc<dyn QualityStore>,
    parsers: RwLock<Vec<Arc<dyn SearchParser>>>,
    listeners: RwLock<Vec<Arc<dyn ItemListener<FeedItem>>>>,
    max_concurrent_searches: usize,
}

/// Counts collected while searching one episode.
#[derive(Default)]
struct SearchTally {
    items: AtomicUsize,
    failures: AtomicUsize,
}

impl Shared {
    /// Episodes that are DESIRED and have no accepted decision.
    fn pending_episodes(&self) -> Result<Vec<Name>, StoreError> {
        let mut pending = Vec::new();
        for episode in self.shows.list_by_state(State::Desired)? {
            let accepted = self
                .decisions
                .get(&episode.name)?
                .is_some_and(|d| d.is_accepted());
            if !accepted {
                pending.push(episode.name);
            }
        }
        Ok(pending)
    }

    async fn search(&self, name: &Name, tally: &SearchTally) {
        let parsers = self.parsers.read().await.clone();
        let listeners = self.listeners.read().await.clone();

        for parser in parsers {
            let items = match parser.search(name).await {
                Ok(items) => {
                    metrics::BACKFILL_SEARCHES
                        .with_label_values(&["success"])
                        .inc();
                    items
                }
                Err(e) => {
                    metrics::BACKFILL_SEARCHES
                        .with_label_values(&["failed"])
                        .inc();
                    tally.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(source = parser.name(), name = %name, error = %e, "Search failed");
                    for listener in &listeners {
                        listener.on_error(parser.name(), &e).await;
                    }
                    continue;
                }
            };

            debug!(source = parser.name(), name = %name, found = items.len(), "Search complete");
            tally.items.fetch_add(items.len(), Ordering::Relaxed);
            for item in items {
                for listener in &listeners {
                    let listener = Arc::clone(listener);
                    let item = item.clone();
                    let delivery = tokio::spawn(async move { listener.on_new_item(item).await });
                    if let Err(e) = delivery.await {
                        warn!(
                            source = parser.name(),
                            name = %name,
                            error = %e,
                            "Listener delivery aborted"
                        );
                    }
                }
            }
        }
    }

    async fn tick(&self) -> BackfillReport {
        let pending = match self.pending_episodes() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to list desired episodes");
                return BackfillReport::default();
            }
        };

        let tally = SearchTally::default();
        stream::iter(pending.iter())
            .for_each_concurrent(self.max_concurrent_searches.max(1), |name| {
                self.search(name, &tally)
            })
            .await;

        BackfillReport {
            episodes: pending.len(),
            items_found: tally.items.load(Ordering::Relaxed),
            failed_searches: tally.failures.load(Ordering::Relaxed),
        }
    }
}

/// Periodically searches for desired episodes that no feed has satisfied.
pub struct BackfillManager {
    config: BackfillConfig,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackfillManager {
    pub fn new(
        config: BackfillConfig,
        shows: Arc<dyn ShowStore>,
        decisions: Arc<dyn QualityStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Shared {
            shows,
            decisions,
            parsers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            max_concurrent_searches: config.max_concurrent_searches,
        };
        Self {
            config,
            shared: Arc::new(shared),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    pub async fn add_parser(&self, parser: Arc<dyn SearchParser>) {
        self.shared.parsers.write().await.push(parser);
    }

    pub async fn add_listener(&self, listener: Arc<dyn ItemListener<FeedItem>>) {
        self.shared.listeners.write().await.push(listener);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Runs one backfill pass over every pending episode.
    pub async fn run_once(&self) -> BackfillReport {
        self.shared.tick().await
    }

    /// Searches every parser for one episode, outside the timer. Returns the
    /// number of items delivered to listeners.
    pub async fn search_episode(&self, name: &Name) -> usize {
        let tally = SearchTally::default();
        self.shared.search(name, &tally).await;
        tally.items.load(Ordering::Relaxed)
    }

    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Backfill loop already running");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.interval.max(Duration::from_millis(1));
        let first_tick = if self.config.poll_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };

        info!(interval_secs = period.as_secs(), "Starting backfill loop");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let pass = tokio::spawn({
                            let shared = Arc::clone(&shared);
                            async move { shared.tick().await }
                        });
                        let abort = pass.abort_handle();
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                abort.abort();
                                break;
                            }
                            result = pass => match result {
                                Ok(report) => debug!(
                                    episodes = report.episodes,
                                    items_found = report.items_found,
                                    failed_searches = report.failed_searches,
                                    "Backfill pass complete"
                                ),
                                Err(e) => warn!(error = %e, "Backfill pass aborted"),
                            },
                        }
                    }
                }
            }
            info!("Backfill loop stopped");
        });

        *self.task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Backfill task ended abnormally");
            }
        }
    }
}

#[async_trait]
impl Managed for BackfillManager {
    fn name(&self) -> &str {
        "backfill"
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        BackfillManager::start(self).await;
        Ok(())
    }

    async fn stop(&self) {
        BackfillManager::stop(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ParserError;
    use crate::models::{Episode, QualityTier};
    use crate::store::SqliteStore;
    use crate::testing::{fixtures, MockSearchParser, RecordingListener};
    use chrono::Utc;

    fn manager(store: &Arc<SqliteStore>) -> BackfillManager {
        BackfillManager::new(
            BackfillConfig::new(Duration::from_secs(3600)),
            store.clone(),
            store.clone(),
        )
    }

    #[tokio::test]
    async fn test_searches_only_unaccepted_desired_episodes() {
        let store = fixtures::store();
        let pending = Name::new("house", 3, 1);
        let accepted = Name::new("house", 3, 2);
        let existing = Name::new("house", 3, 3);
        fixtures::desire(&store, &pending);
        fixtures::desire(&store, &accepted);
        store.upsert(&Episode::existing(existing)).unwrap();
        store.get_or_create(&accepted, Utc::now()).unwrap();
        store
            .set_accepted(&accepted, QualityTier::Primary, Utc::now())
            .unwrap();

        let search = Arc::new(MockSearchParser::new("search"));
        search
            .set_results(vec![fixtures::feed_item("r1", "House.S03E01.1080p")])
            .await;
        let listener = Arc::new(RecordingListener::new());

        let backfill = manager(&store);
        backfill.add_parser(search.clone()).await;
        backfill.add_listener(listener.clone()).await;

        let report = backfill.run_once().await;
        assert_eq!(report.episodes, 1);
        assert_eq!(report.items_found, 1);
        assert_eq!(search.searches().await, vec![pending]);
        assert_eq!(listener.items().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_search_does_not_block_others() {
        let store = fixtures::store();
        let first = Name::new("house", 3, 1);
        let second = Name::new("lost", 1, 1);
        fixtures::desire(&store, &first);
        fixtures::desire(&store, &second);

        let search = Arc::new(MockSearchParser::new("search"));
        search.fail_for(&first, ParserError::Timeout).await;
        search
            .set_results_for(&second, vec![fixtures::feed_item("l1", "Lost.S01E01.720p")])
            .await;
        let listener = Arc::new(RecordingListener::new());

        let backfill = manager(&store);
        backfill.add_parser(search.clone()).await;
        backfill.add_listener(listener.clone()).await;

        let report = backfill.run_once().await;
        assert_eq!(report.episodes, 2);
        assert_eq!(report.failed_searches, 1);
        assert_eq!(listener.items().await.len(), 1);
        assert_eq!(listener.errors().await, vec!["search".to_string()]);
    }

    #[tokio::test]
    async fn test_search_episode_queries_every_parser() {
        let store = fixtures::store();
        let name = Name::new("house", 3, 1);
        let a = Arc::new(MockSearchParser::new("a"));
        let b = Arc::new(MockSearchParser::new("b"));
        a.set_results(vec![fixtures::feed_item("a1", "House.S03E01.720p")])
            .await;
        b.set_results(vec![fixtures::feed_item("b1", "House.S03E01.1080p")])
            .await;

        let backfill = manager(&store);
        backfill.add_parser(a.clone()).await;
        backfill.add_parser(b.clone()).await;

        assert_eq!(backfill.search_episode(&name).await, 2);
        assert_eq!(a.searches().await, vec![name.clone()]);
        assert_eq!(b.searches().await, vec![name]);
    }

    struct PanickingListener;

    #[async_trait]
    impl ItemListener<FeedItem> for PanickingListener {
        async fn on_new_item(&self, _item: FeedItem) {
            panic!("listener blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_lose_other_deliveries() {
        let store = fixtures::store();
        let name = Name::new("house", 3, 1);
        fixtures::desire(&store, &name);
        let search = Arc::new(MockSearchParser::new("search"));
        search
            .set_results(vec![
                fixtures::feed_item("r1", "House.S03E01.720p"),
                fixtures::feed_item("r2", "House.S03E01.1080p"),
            ])
            .await;
        let recorder = Arc::new(RecordingListener::new());

        let backfill = manager(&store);
        backfill.add_parser(search).await;
        backfill.add_listener(Arc::new(PanickingListener)).await;
        backfill.add_listener(recorder.clone()).await;

        let report = backfill.run_once().await;
        assert_eq!(report.items_found, 2);
        assert_eq!(recorder.items().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_survives_panicking_listener() {
        let store = fixtures::store();
        fixtures::desire(&store, &Name::new("house", 3, 1));
        let search = Arc::new(MockSearchParser::new("search"));
        search
            .set_results(vec![fixtures::feed_item("r1", "House.S03E01.720p")])
            .await;

        let backfill = BackfillManager::new(
            BackfillConfig::new(Duration::from_secs(60)),
            store.clone(),
            store.clone(),
        );
        backfill.add_parser(search.clone()).await;
        backfill.add_listener(Arc::new(PanickingListener)).await;

        backfill.start().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(search.searches().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(search.searches().await.len(), 6);
        backfill.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_start_stop() {
        let store = fixtures::store();
        let name = Name::new("house", 3, 1);
        fixtures::desire(&store, &name);
        let search = Arc::new(MockSearchParser::new("search"));

        let backfill = manager(&store);
        backfill.add_parser(search.clone()).await;

        backfill.start().await;
        assert!(backfill.is_running());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(search.searches().await.len(), 1);

        backfill.stop().await;
        assert!(!backfill.is_running());
        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(search.searches().await.len(), 1);
    }
}
