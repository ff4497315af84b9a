//! Generic scheduled feed poller.
//!
//! Each scheduler instance owns its own timer task, so a slow parser in one
//! instance never delays ticks of another. Within a tick every parser is
//! fetched concurrently, new items are deduplicated by identity and delivered
//! to every listener through a bounded pool of tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::lifecycle::{LifecycleError, Managed};
use crate::metrics;
use crate::models::Identified;

use super::types::{FeedParser, ItemListener, ParserError};

/// Configuration for one scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name used in logs and metrics.
    pub name: String,
    pub interval: Duration,
    /// Run the first tick at start instead of after one interval.
    pub poll_immediately: bool,
    /// Minimum time an identity is remembered. The effective retention is
    /// never shorter than two intervals.
    pub retention: Duration,
    pub max_concurrent_deliveries: usize,
}

impl SchedulerConfig {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            poll_immediately: true,
            retention: Duration::ZERO,
            max_concurrent_deliveries: 4,
        }
    }

    fn effective_retention(&self) -> Duration {
        self.retention.max(self.interval * 2)
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub new_items: usize,
    pub failed_parsers: usize,
}

/// Identities already delivered, forgotten after the retention window.
struct SeenCache {
    retention: Duration,
    seen: HashMap<String, Instant>,
}

impl SeenCache {
    fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: HashMap::new(),
        }
    }

    /// Returns `true` if the identity was not already remembered.
    fn insert(&mut self, identity: &str, now: Instant) -> bool {
        if self.seen.contains_key(identity) {
            return false;
        }
        self.seen.insert(identity.to_string(), now);
        true
    }

    fn prune(&mut self, now: Instant) {
        let retention = self.retention;
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < retention);
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

struct Shared<T> {
    name: String,
    parsers: RwLock<Vec<Arc<dyn FeedParser<T>>>>,
    listeners: RwLock<Vec<Arc<dyn ItemListener<T>>>>,
    seen: StdMutex<SeenCache>,
    deliveries: Arc<Semaphore>,
}

impl<T> Shared<T>
where
    T: Identified + Clone + Send + Sync + 'static,
{
    async fn poll(&self) -> PollReport {
        let parsers = self.parsers.read().await.clone();
        let listeners = self.listeners.read().await.clone();

        let fetches = parsers.iter().map(|parser| async move {
            let start = std::time::Instant::now();
            let result = parser.fetch().await;
            metrics::PARSER_FETCH_DURATION
                .with_label_values(&[parser.name()])
                .observe(start.elapsed().as_secs_f64());
            (parser, result)
        });
        let results = futures::future::join_all(fetches).await;

        let mut report = PollReport::default();
        let mut fresh: Vec<T> = Vec::new();
        let mut failures: Vec<(String, ParserError)> = Vec::new();
        {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            seen.prune(now);
            for (parser, result) in results {
                match result {
                    Ok(items) => {
                        report.fetched += items.len();
                        for item in items {
                            if seen.insert(item.identity(), now) {
                                fresh.push(item);
                            }
                        }
                    }
                    Err(e) => failures.push((parser.name().to_string(), e)),
                }
            }
            debug!(scheduler = %self.name, remembered = seen.len(), "Seen cache pruned");
        }

        report.failed_parsers = failures.len();
        for (source, error) in &failures {
            warn!(scheduler = %self.name, source = %source, error = %error, "Parser fetch failed");
            metrics::PARSER_FAILURES
                .with_label_values(&[self.name.as_str(), source.as_str()])
                .inc();
            for listener in &listeners {
                listener.on_error(source, error).await;
            }
        }

        report.new_items = fresh.len();
        metrics::FEED_ITEMS_DELIVERED
            .with_label_values(&[self.name.as_str()])
            .inc_by(fresh.len() as u64);
        self.deliver(fresh, &listeners).await;

        report
    }

    /// Each (item, listener) pair runs in its own task, so a panicking
    /// listener loses only that delivery.
    async fn deliver(&self, items: Vec<T>, listeners: &[Arc<dyn ItemListener<T>>]) {
        let mut handles = Vec::with_capacity(items.len() * listeners.len());
        for item in items {
            for listener in listeners {
                let listener = Arc::clone(listener);
                let item = item.clone();
                let permits = Arc::clone(&self.deliveries);
                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    listener.on_new_item(item).await;
                }));
            }
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(scheduler = %self.name, error = %e, "Listener delivery aborted");
            }
        }
    }
}

/// Polls a dynamic set of parsers on a fixed interval and fans new items
/// out to listeners.
pub struct FeedScheduler<T> {
    config: SchedulerConfig,
    shared: Arc<Shared<T>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> FeedScheduler<T>
where
    T: Identified + Clone + Send + Sync + 'static,
{
    pub fn new(config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Shared {
            name: config.name.clone(),
            parsers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            seen: StdMutex::new(SeenCache::new(config.effective_retention())),
            deliveries: Arc::new(Semaphore::new(config.max_concurrent_deliveries.max(1))),
        };

        Self {
            config,
            shared: Arc::new(shared),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn add_parser(&self, parser: Arc<dyn FeedParser<T>>) {
        self.shared.parsers.write().await.push(parser);
    }

    /// Removes every parser with the given name; returns whether any was removed.
    pub async fn remove_parser(&self, name: &str) -> bool {
        let mut parsers = self.shared.parsers.write().await;
        let before = parsers.len();
        parsers.retain(|p| p.name() != name);
        parsers.len() != before
    }

    pub async fn parser_count(&self) -> usize {
        self.shared.parsers.read().await.len()
    }

    pub async fn add_listener(&self, listener: Arc<dyn ItemListener<T>>) {
        self.shared.listeners.write().await.push(listener);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Runs one poll cycle and waits for its deliveries.
    pub async fn poll_once(&self) -> PollReport {
        self.shared.poll().await
    }

    /// Start the timer task.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(scheduler = %self.config.name, "Scheduler already running");
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

        info!(
            scheduler = %self.config.name,
            interval_secs = period.as_secs(),
            poll_immediately = self.config.poll_immediately,
            "Starting feed scheduler"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        // in-flight fetches are abandoned on shutdown
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            report = shared.poll() => {
                                debug!(
                                    scheduler = %shared.name,
                                    fetched = report.fetched,
                                    new_items = report.new_items,
                                    failed_parsers = report.failed_parsers,
                                    "Poll complete"
                                );
                            }
                        }
                    }
                }
            }
            info!(scheduler = %shared.name, "Feed scheduler loop stopped");
        });

        *self.task.lock().await = Some(handle);
    }

    /// Stop the timer task. No tick starts after this returns.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(scheduler = %self.config.name, error = %e, "Scheduler task ended abnormally");
            }
        }
        info!(scheduler = %self.config.name, "Feed scheduler stopped");
    }
}

#[async_trait]
impl<T> Managed for FeedScheduler<T>
where
    T: Identified + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        FeedScheduler::start(self).await;
        Ok(())
    }

    async fn stop(&self) {
        FeedScheduler::stop(self).await;
    }
}
