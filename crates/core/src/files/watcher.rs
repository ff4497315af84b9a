//! Filesystem watcher feeding the dispatcher.
//!
//! Raw `notify` events are bridged into a tokio channel. A path is only
//! dispatched once no event has been seen for it during the settle delay, so
//! files still being written by the download client are not picked up early.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::lifecycle::{LifecycleError, Managed};

use super::dispatcher::{DispatchOutcome, Dispatcher};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub root: PathBuf,
    /// Quiet period required before an entry is dispatched.
    pub settle_delay: Duration,
    /// Dispatch entries already present at start.
    pub scan_existing: bool,
    pub max_concurrent_handlers: usize,
}

impl WatcherConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            settle_delay: Duration::from_millis(2000),
            scan_existing: true,
            max_concurrent_handlers: 2,
        }
    }

    fn flush_interval(&self) -> Duration {
        (self.settle_delay / 4).clamp(Duration::from_millis(10), Duration::from_millis(500))
    }
}

/// Per-run bookkeeping, owned by the watch loop.
struct SettleState {
    root: PathBuf,
    pending: HashMap<PathBuf, Instant>,
    /// Dispatched paths that still exist. Forgotten once the path is gone.
    dispatched: HashSet<PathBuf>,
}

impl SettleState {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            pending: HashMap::new(),
            dispatched: HashSet::new(),
        }
    }

    fn touch(&mut self, path: PathBuf, at: Instant) {
        if path == self.root || self.dispatched.contains(&path) {
            return;
        }
        self.pending.insert(path, at);
    }

    fn record(&mut self, event: Event, now: Instant) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    self.touch(path, now);
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.pending.remove(path);
                    self.dispatched.remove(path);
                }
            }
            _ => {}
        }
    }

    /// Removes and returns every pending path that has been quiet for
    /// `settle_delay` and still exists. Deeper paths come first.
    fn take_settled(&mut self, now: Instant, settle_delay: Duration) -> Vec<PathBuf> {
        // renames away from the root arrive as modify events, not removals
        self.dispatched.retain(|path| path.exists());

        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= settle_delay)
            .map(|(path, _)| path.clone())
            .collect();

        let mut settled = Vec::with_capacity(due.len());
        for path in due {
            self.pending.remove(&path);
            if !path.exists() {
                trace!(path = %path.display(), "Entry vanished before settling");
                continue;
            }
            if self.dispatched.insert(path.clone()) {
                settled.push(path);
            }
        }
        settled.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        settled
    }
}

/// Collects every entry below `root`, files and directories alike.
async fn scan_tree(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path.clone());
            }
            found.push(path);
        }
    }
    Ok(found)
}

fn start_failed(reason: impl ToString) -> LifecycleError {
    LifecycleError::StartFailed {
        component: "directory-watcher".to_string(),
        reason: reason.to_string(),
    }
}

/// Watches a root directory and hands settled entries to the dispatcher.
pub struct DirectoryWatcher {
    config: WatcherConfig,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DirectoryWatcher {
    pub fn new(config: WatcherConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Registers the OS watch and spawns the settle loop. The root directory
    /// is created when missing.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(root = %self.config.root.display(), "Directory watcher already running");
            return Ok(());
        }

        match self.spawn_loop().await {
            Ok(handle) => {
                *self.task.lock().await = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn spawn_loop(&self) -> Result<JoinHandle<()>, LifecycleError> {
        let root = self.config.root.clone();
        tokio::fs::create_dir_all(&root).await.map_err(start_failed)?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // receiver gone means the loop has stopped
                let _ = event_tx.send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(start_failed)?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(start_failed)?;

        let mut state = SettleState::new(root.clone());
        if self.config.scan_existing {
            let existing = scan_tree(&root).await.map_err(start_failed)?;
            debug!(root = %root.display(), entries = existing.len(), "Scanned existing entries");
            let due = Instant::now()
                .checked_sub(self.config.settle_delay)
                .unwrap_or_else(Instant::now);
            for path in existing {
                state.touch(path, due);
            }
        }

        info!(
            root = %root.display(),
            settle_ms = self.config.settle_delay.as_millis() as u64,
            "Starting directory watcher"
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let handlers = Arc::new(Semaphore::new(self.config.max_concurrent_handlers.max(1)));
        let settle_delay = self.config.settle_delay;
        let flush_interval = self.config.flush_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            // the OS watch lives exactly as long as this loop
            let _watcher = watcher;
            let mut in_flight = JoinSet::new();
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    Some(res) = event_rx.recv() => match res {
                        Ok(event) => state.record(event, Instant::now()),
                        Err(e) => warn!(error = %e, "Filesystem watch error"),
                    },
                    _ = ticker.tick() => {
                        while let Some(res) = in_flight.try_join_next() {
                            if let Err(e) = res {
                                warn!(error = %e, "File handler task panicked");
                            }
                        }
                        for path in state.take_settled(Instant::now(), settle_delay) {
                            let dispatcher = Arc::clone(&dispatcher);
                            let handlers = Arc::clone(&handlers);
                            in_flight.spawn(async move {
                                let Ok(_permit) = handlers.acquire_owned().await else {
                                    return;
                                };
                                if let DispatchOutcome::Handled(handler) =
                                    dispatcher.dispatch(&path).await
                                {
                                    debug!(path = %path.display(), handler = %handler, "Entry handled");
                                }
                            });
                        }
                    }
                }
            }

            while let Some(res) = in_flight.join_next().await {
                if let Err(e) = res {
                    warn!(error = %e, "File handler task panicked");
                }
            }
            info!(root = %state.root.display(), "Directory watcher loop stopped");
        });

        Ok(handle)
    }

    /// Stops watching and waits for in-flight handlers to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Directory watcher task ended abnormally");
            }
        }
        info!(root = %self.config.root.display(), "Directory watcher stopped");
    }
}

#[async_trait]
impl Managed for DirectoryWatcher {
    fn name(&self) -> &str {
        "directory-watcher"
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        DirectoryWatcher::start(self).await
    }

    async fn stop(&self) {
        DirectoryWatcher::stop(self).await;
    }
}
