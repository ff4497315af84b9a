//! Filing integration tests.
//!
//! A file landing in the watch directory goes through the dispatcher, the
//! media file handler and the library listener:
//! - Library layout and episode state after landing
//! - Rejected artifacts cleaned up
//! - End to end with the filesystem watcher running

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mediamanager_core::{
    files::{DispatchOutcome, TransferMode},
    models::{Name, State},
    testing::fixtures,
    DirectoryWatcher, Dispatcher, EpisodeNameParser, FileTransfer, GarbageFileHandler,
    HandledFileStore, LibraryListener, MediaFileConfig, MediaFileHandler, ShowStore, SqliteStore,
    WatcherConfig,
};

const MIN_SIZE: u64 = 1024;

struct TestHarness {
    _temp: TempDir,
    watch: PathBuf,
    library: PathBuf,
    store: Arc<SqliteStore>,
    dispatcher: Arc<Dispatcher>,
}

impl TestHarness {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let watch = temp.path().join("downloads");
        let staging = temp.path().join("staging");
        let library = temp.path().join("library");
        std::fs::create_dir_all(&watch).unwrap();

        let store = fixtures::store();
        let library_listener = Arc::new(LibraryListener::new(
            Arc::new(EpisodeNameParser::default()),
            store.clone(),
            FileTransfer::default(),
            &library,
        ));

        let mut config = MediaFileConfig::new(&staging, TransferMode::Move);
        config.min_file_size = MIN_SIZE;
        let mut media = MediaFileHandler::new(config, FileTransfer::default(), store.clone());
        media.add_listener(library_listener);

        let garbage = Arc::new(GarbageFileHandler::new(["nfo", "txt"]));
        let mut dispatcher = Dispatcher::new(&watch);
        dispatcher.add_handler(Arc::new(media));
        dispatcher.add_handler(garbage.clone());
        dispatcher.set_directory_handler(garbage);

        Self {
            _temp: temp,
            watch,
            library,
            store,
            dispatcher: Arc::new(dispatcher),
        }
    }
}

#[tokio::test]
async fn test_landed_episode_filed_into_library() {
    let h = TestHarness::new();
    let name = Name::new("house", 3, 1);
    fixtures::desire(&h.store, &name);

    let landed = h.watch.join("house.s03e01.720p.mkv");
    fixtures::write_file(&landed, 4096);

    assert_eq!(
        h.dispatcher.dispatch(&landed).await,
        DispatchOutcome::Handled("media".to_string())
    );

    let filed = h.library.join("house/Season 03/house.s03e01.720p.mkv");
    assert!(filed.exists());
    assert!(!landed.exists());
    assert_eq!(std::fs::metadata(&filed).unwrap().len(), 4096);
    assert_eq!(h.store.get(&name).unwrap().unwrap().state, State::Exists);
    assert!(h.store.contains("house.s03e01.720p.mkv").unwrap());
}

#[tokio::test]
async fn test_sample_and_garbage_removed() {
    let h = TestHarness::new();
    let sample = h.watch.join("house.s03e01.sample.mkv");
    let nfo = h.watch.join("house.s03e01.nfo");
    fixtures::write_file(&sample, 4096);
    fixtures::write_file(&nfo, 16);

    h.dispatcher.dispatch(&sample).await;
    h.dispatcher.dispatch(&nfo).await;

    assert!(!sample.exists());
    assert!(!nfo.exists());
    assert!(!h.library.join("house").exists());
}

#[tokio::test]
async fn test_unparsable_media_stays_in_staging() {
    let h = TestHarness::new();
    let landed = h.watch.join("holiday video.mkv");
    fixtures::write_file(&landed, 4096);

    h.dispatcher.dispatch(&landed).await;

    let staged = h.watch.parent().unwrap().join("staging/holiday video.mkv");
    assert!(staged.exists());
}

#[tokio::test]
async fn test_watcher_files_new_download() {
    let h = TestHarness::new();
    let watcher = DirectoryWatcher::new(
        WatcherConfig {
            root: h.watch.clone(),
            settle_delay: Duration::from_millis(100),
            scan_existing: false,
            max_concurrent_handlers: 2,
        },
        h.dispatcher.clone(),
    );
    watcher.start().await.unwrap();

    fixtures::write_file(&h.watch.join("lost.s01e04.1080p.mkv"), 4096);

    let filed = h.library.join("lost/Season 01/lost.s01e04.1080p.mkv");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !filed.exists() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    watcher.stop().await;

    assert!(filed.exists());
    let episode = h.store.get(&Name::new("lost", 1, 4)).unwrap().unwrap();
    assert_eq!(episode.state, State::Exists);
}
