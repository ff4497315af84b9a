//! Builds the running service from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use mediamanager_core::config::Config;
use mediamanager_core::files::{
    DirectoryWatcher, Dispatcher, FileTransfer, GarbageFileHandler, MediaFileConfig,
    MediaFileHandler, TransferMode, WatcherConfig,
};
use mediamanager_core::models::{FeedItem, QualityTiers};
use mediamanager_core::{
    ArbiterConfig, BackfillConfig, BackfillManager, CalendarListener, DownloadableItemListener,
    EpisodeNameParser, FeedScheduler, LibraryListener, Lifecycle, ParserRegistry, QualityArbiter,
    RetryPolicy, SchedulerConfig, SqliteStore, WatchDirDownloader,
};

/// All managed components, ready to start.
pub struct App {
    pub lifecycle: Lifecycle,
}

pub async fn build(config: &Config) -> Result<App> {
    let torrents = &config.torrents;
    let files = &config.files;

    for dir in [
        &torrents.watch_dir,
        &files.watch_dir,
        &files.temp_dir,
        &files.destination_dir,
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }

    let store = Arc::new(
        SqliteStore::new(&config.database.path).context("Failed to open database")?,
    );
    info!("Store initialized at {:?}", config.database.path);

    let names = Arc::new(EpisodeNameParser::new(config.aliases.iter()));
    let registry = ParserRegistry::with_builtins(torrents.request_timeout());

    // Acquisition path: feeds and backfill -> arbiter -> torrent watch dir
    let arbiter = Arc::new(QualityArbiter::new(
        ArbiterConfig {
            tiers: QualityTiers::new(&torrents.primary_qualities, &torrents.secondary_qualities),
            primary_quality_timeout: torrents.primary_quality_timeout(),
        },
        store.clone(),
        store.clone(),
    ));
    let downloader = Arc::new(
        WatchDirDownloader::new(
            &torrents.watch_dir,
            torrents.request_timeout(),
            RetryPolicy::from_config(&config.retry),
        )
        .context("Failed to create downloader")?,
    );
    let downloadable = Arc::new(DownloadableItemListener::new(
        names.clone(),
        arbiter,
        downloader,
    ));

    let backfill = Arc::new(BackfillManager::new(
        BackfillConfig {
            interval: torrents.backfill_interval(),
            poll_immediately: torrents.poll_immediately,
            max_concurrent_searches: torrents.max_concurrent_deliveries,
        },
        store.clone(),
        store.clone(),
    ));
    for (id, parser) in &torrents.searchers {
        let search = registry
            .create_search(parser.source_name(id), id, &parser.settings)
            .with_context(|| format!("Failed to create search parser '{}'", id))?;
        backfill.add_parser(search).await;
    }
    backfill.add_listener(downloadable.clone()).await;

    let feeds = scheduler("torrents", torrents.update_interval(), torrents.poll_immediately);
    for (id, parser) in &torrents.feeders {
        let feed = registry
            .create_feed(parser.source_name(id), id, &parser.settings)
            .with_context(|| format!("Failed to create feed parser '{}'", id))?;
        feeds.add_parser(feed).await;
    }
    feeds.add_listener(downloadable).await;

    let calendars = scheduler(
        "calendars",
        config.calendars.update_interval(),
        config.calendars.poll_immediately,
    );
    for (id, parser) in &config.calendars.parsers {
        let feed = registry
            .create_feed(parser.source_name(id), id, &parser.settings)
            .with_context(|| format!("Failed to create calendar parser '{}'", id))?;
        calendars.add_parser(feed).await;
    }
    calendars
        .add_listener(Arc::new(
            CalendarListener::new(names.clone(), store.clone()).with_backfill(backfill.clone()),
        ))
        .await;

    // Filing path: watch dir -> media handler -> staging -> library
    let library = Arc::new(LibraryListener::new(
        names,
        store.clone(),
        FileTransfer::new(files.checksum),
        &files.destination_dir,
    ));
    let mode = if files.delete_originals {
        TransferMode::Move
    } else {
        TransferMode::Copy
    };
    let mut media = MediaFileHandler::new(
        MediaFileConfig {
            destination_dir: files.temp_dir.clone(),
            mode,
            min_file_size: files.min_file_size_bytes,
            extensions: files.media_extensions.clone(),
            delete_rejected: files.delete_rejected,
        },
        FileTransfer::new(files.checksum),
        store.clone(),
    );
    media.add_listener(library);

    let mut dispatcher = Dispatcher::new(&files.watch_dir);
    dispatcher.add_handler(Arc::new(media));
    if files.delete_originals {
        let garbage = Arc::new(GarbageFileHandler::new(&files.garbage_extensions));
        dispatcher.add_handler(garbage.clone());
        dispatcher.set_directory_handler(garbage);
    }

    let watcher = Arc::new(DirectoryWatcher::new(
        WatcherConfig {
            root: files.watch_dir.clone(),
            settle_delay: files.settle_delay(),
            scan_existing: files.scan_existing,
            max_concurrent_handlers: files.max_concurrent_handlers,
        },
        Arc::new(dispatcher),
    ));

    info!(
        feeders = torrents.feeders.len(),
        searchers = torrents.searchers.len(),
        calendars = config.calendars.parsers.len(),
        "Parsers configured"
    );

    let mut lifecycle = Lifecycle::new();
    lifecycle.register(watcher);
    lifecycle.register(backfill);
    lifecycle.register(calendars);
    lifecycle.register(feeds);

    Ok(App { lifecycle })
}

fn scheduler(
    name: &str,
    interval: Duration,
    poll_immediately: bool,
) -> Arc<FeedScheduler<FeedItem>> {
    let mut config = SchedulerConfig::new(name, interval);
    config.poll_immediately = poll_immediately;
    Arc::new(FeedScheduler::new(config))
}
