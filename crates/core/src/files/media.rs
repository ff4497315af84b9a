//! Handler for finished media files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tokio::fs;
use tracing::{debug, info};

use crate::feed::ItemListener;
use crate::metrics;
use crate::store::HandledFileStore;

use super::error::FileError;
use super::handler::{file_extension, file_name, FileHandler};
use super::transfer::{FileTransfer, TransferMode};

static SAMPLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsample\b").expect("valid regex"));

/// Default minimum size for a media file (100 MiB).
pub const DEFAULT_MIN_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default recognised media extensions.
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &["avi", "mkv", "mp4", "divx"];

/// Why a media file was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRejection {
    UnsupportedExtension,
    Sample,
    AlreadyHandled,
    TooSmall { size_bytes: u64 },
}

#[derive(Debug, Clone)]
pub struct MediaFileConfig {
    /// Where accepted files are transferred to.
    pub destination_dir: PathBuf,
    pub mode: TransferMode,
    pub min_file_size: u64,
    pub extensions: Vec<String>,
    /// Delete files rejected by the acceptance gate.
    pub delete_rejected: bool,
}

impl MediaFileConfig {
    pub fn new(destination_dir: impl Into<PathBuf>, mode: TransferMode) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            mode,
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            delete_rejected: true,
        }
    }
}

/// Validates, deduplicates and transfers media files, then notifies the
/// library listeners with the transferred path.
pub struct MediaFileHandler {
    config: MediaFileConfig,
    extensions: HashSet<String>,
    transfer: FileTransfer,
    handled: Arc<dyn HandledFileStore>,
    listeners: Vec<Arc<dyn ItemListener<PathBuf>>>,
    /// Filenames currently between the handled check and the handled mark.
    in_flight: Mutex<HashSet<String>>,
}

/// Exclusive claim on a filename, released on drop.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

impl MediaFileHandler {
    pub fn new(
        config: MediaFileConfig,
        transfer: FileTransfer,
        handled: Arc<dyn HandledFileStore>,
    ) -> Self {
        let extensions = config
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self {
            config,
            extensions,
            transfer,
            handled,
            listeners: Vec::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Claims `name` for this handler call. Returns `None` while another
    /// call holds the same filename.
    fn claim(&self, name: &str) -> Option<Claim<'_>> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        inserted.then(|| Claim {
            in_flight: &self.in_flight,
            name: name.to_string(),
        })
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ItemListener<PathBuf>>) {
        self.listeners.push(listener);
    }

    /// Name-only part of the gate: extension and sample pattern.
    pub fn accepts_name(&self, name: &str) -> Result<(), MediaRejection> {
        if !self.extensions.contains(&file_extension(name)) {
            return Err(MediaRejection::UnsupportedExtension);
        }
        if SAMPLE_PATTERN.is_match(name) {
            return Err(MediaRejection::Sample);
        }
        Ok(())
    }

    /// Runs the full acceptance gate without side effects.
    pub async fn check(&self, path: &Path) -> Result<Result<(), MediaRejection>, FileError> {
        let name = file_name(path).ok_or_else(|| FileError::SourceNotFound {
            path: path.to_path_buf(),
        })?;

        if let Err(rejection) = self.accepts_name(name) {
            return Ok(Err(rejection));
        }

        if self.handled.contains(name)? {
            return Ok(Err(MediaRejection::AlreadyHandled));
        }

        let size_bytes = fs::metadata(path).await?.len();
        if size_bytes < self.config.min_file_size {
            return Ok(Err(MediaRejection::TooSmall { size_bytes }));
        }

        Ok(Ok(()))
    }

    async fn reject(&self, path: &Path, rejection: MediaRejection) -> Result<(), FileError> {
        metrics::FILES_HANDLED.with_label_values(&["rejected"]).inc();
        debug!(path = %path.display(), reason = ?rejection, "Rejected media file");

        if self.config.delete_rejected {
            fs::remove_file(path)
                .await
                .map_err(|e| FileError::DeleteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            debug!(path = %path.display(), "Deleted rejected media file");
        }
        Ok(())
    }
}

#[async_trait]
impl FileHandler for MediaFileHandler {
    fn name(&self) -> &str {
        "media"
    }

    fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.extensions.iter().cloned().collect();
        extensions.sort();
        extensions
    }

    async fn handle_file(&self, relative_path: &str, path: &Path) -> Result<(), FileError> {
        let name = file_name(path)
            .ok_or_else(|| FileError::SourceNotFound {
                path: path.to_path_buf(),
            })?
            .to_string();

        // held until the filename is marked handled
        let Some(_claim) = self.claim(&name) else {
            metrics::FILES_HANDLED.with_label_values(&["skipped"]).inc();
            debug!(path = relative_path, "Same filename is already being handled");
            return Ok(());
        };

        if let Err(rejection) = self.check(path).await? {
            return self.reject(path, rejection).await;
        }

        let destination = self.config.destination_dir.join(&name);

        let transfer = match self
            .transfer
            .transfer(path, &destination, self.config.mode)
            .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                metrics::FILES_HANDLED.with_label_values(&["failed"]).inc();
                return Err(e);
            }
        };

        info!(
            path = relative_path,
            destination = %transfer.destination.display(),
            size_bytes = transfer.size_bytes,
            verified = transfer.verified(),
            "Media file transferred"
        );

        for listener in &self.listeners {
            listener.on_new_item(transfer.destination.clone()).await;
        }

        self.handled.mark_handled(&name)?;
        metrics::FILES_HANDLED.with_label_values(&["accepted"]).inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::testing::RecordingListener;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        watch: PathBuf,
        staging: PathBuf,
        store: Arc<SqliteStore>,
        listener: Arc<RecordingListener<PathBuf>>,
        handler: MediaFileHandler,
    }

    /// Minimum size scaled down to 150 KiB so the 150 MB / 50 MB cases can
    /// be exercised at 1/1024 scale.
    fn fixture(mode: TransferMode) -> Fixture {
        let temp = TempDir::new().unwrap();
        let watch = temp.path().join("watch");
        let staging = temp.path().join("staging");
        std::fs::create_dir_all(&watch).unwrap();

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let listener = Arc::new(RecordingListener::new());
        let mut config = MediaFileConfig::new(&staging, mode);
        config.min_file_size = DEFAULT_MIN_FILE_SIZE / 1024;
        let mut handler = MediaFileHandler::new(config, FileTransfer::default(), store.clone());
        handler.add_listener(listener.clone());

        Fixture {
            _temp: temp,
            watch,
            staging,
            store,
            listener,
            handler,
        }
    }

    fn write_file(path: &Path, size: usize) {
        let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_default_size_floor() {
        assert_eq!(DEFAULT_MIN_FILE_SIZE, 104_857_600);
        assert!(150 * 1024 * 1024 >= DEFAULT_MIN_FILE_SIZE);
        assert!(50 * 1024 * 1024 < DEFAULT_MIN_FILE_SIZE);
    }

    #[test]
    fn test_accepts_name() {
        let f = fixture(TransferMode::Move);
        assert_eq!(f.handler.accepts_name("show.s01e01.mkv"), Ok(()));
        assert_eq!(f.handler.accepts_name("Show.S01E01.DIVX"), Ok(()));
        assert_eq!(
            f.handler.accepts_name("show.s01e01.sample.mkv"),
            Err(MediaRejection::Sample)
        );
        assert_eq!(
            f.handler.accepts_name("Sample-show.mkv"),
            Err(MediaRejection::Sample)
        );
        // word boundary: "samples" is not the sample marker
        assert_eq!(f.handler.accepts_name("the.samples.s01e01.mkv"), Ok(()));
        assert_eq!(
            f.handler.accepts_name("show.s01e01.nfo"),
            Err(MediaRejection::UnsupportedExtension)
        );
    }

    #[tokio::test]
    async fn test_small_sample_rejected_and_deleted() {
        let f = fixture(TransferMode::Move);
        let path = f.watch.join("show.s01e01.sample.mkv");
        write_file(&path, 50 * 1024);

        f.handler
            .handle_file("show.s01e01.sample.mkv", &path)
            .await
            .unwrap();

        assert!(!path.exists());
        assert!(f.listener.items().await.is_empty());
        assert!(!f.store.contains("show.s01e01.sample.mkv").unwrap());
    }

    #[tokio::test]
    async fn test_too_small_rejected() {
        let f = fixture(TransferMode::Move);
        let path = f.watch.join("show.s01e02.mkv");
        write_file(&path, 50 * 1024);

        assert_eq!(
            f.handler.check(&path).await.unwrap(),
            Err(MediaRejection::TooSmall {
                size_bytes: 50 * 1024
            })
        );
    }

    #[tokio::test]
    async fn test_accepted_file_moved_notified_and_marked() {
        let f = fixture(TransferMode::Move);
        let path = f.watch.join("show.s01e01.mkv");
        write_file(&path, 150 * 1024);
        let before = FileTransfer::default().calculate_checksum(&path).await.unwrap();

        f.handler.handle_file("show.s01e01.mkv", &path).await.unwrap();

        let destination = f.staging.join("show.s01e01.mkv");
        assert!(!path.exists());
        assert!(destination.exists());
        let after = FileTransfer::default()
            .calculate_checksum(&destination)
            .await
            .unwrap();
        assert_eq!(before, after);
        assert_eq!(f.listener.items().await, vec![destination]);
        assert!(f.store.contains("show.s01e01.mkv").unwrap());
    }

    #[tokio::test]
    async fn test_second_delivery_not_moved_again() {
        let f = fixture(TransferMode::Copy);
        let path = f.watch.join("show.s01e01.mkv");
        write_file(&path, 150 * 1024);

        f.handler.handle_file("show.s01e01.mkv", &path).await.unwrap();
        assert!(path.exists());

        assert_eq!(
            f.handler.check(&path).await.unwrap(),
            Err(MediaRejection::AlreadyHandled)
        );
        f.handler.handle_file("show.s01e01.mkv", &path).await.unwrap();

        assert_eq!(f.listener.items().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_filename_from_two_directories() {
        for _ in 0..10 {
            let temp = TempDir::new().unwrap();
            let first = temp.path().join("watch/a/house.s01e01.mkv");
            let second = temp.path().join("watch/b/house.s01e01.mkv");
            let staging = temp.path().join("staging");
            std::fs::create_dir_all(first.parent().unwrap()).unwrap();
            std::fs::create_dir_all(second.parent().unwrap()).unwrap();
            write_file(&first, 150 * 1024);
            std::fs::write(&second, vec![7u8; 160 * 1024]).unwrap();

            let store = Arc::new(SqliteStore::in_memory().unwrap());
            let listener = Arc::new(RecordingListener::new());
            let mut config = MediaFileConfig::new(&staging, TransferMode::Move);
            config.min_file_size = DEFAULT_MIN_FILE_SIZE / 1024;
            config.delete_rejected = false;
            let mut handler = MediaFileHandler::new(config, FileTransfer::default(), store.clone());
            handler.add_listener(listener.clone());
            let handler = Arc::new(handler);

            let (a, b) = tokio::join!(
                tokio::spawn({
                    let (handler, path) = (handler.clone(), first.clone());
                    async move { handler.handle_file("a/house.s01e01.mkv", &path).await }
                }),
                tokio::spawn({
                    let (handler, path) = (handler.clone(), second.clone());
                    async move { handler.handle_file("b/house.s01e01.mkv", &path).await }
                }),
            );
            a.unwrap().unwrap();
            b.unwrap().unwrap();

            let staged = staging.join("house.s01e01.mkv");
            let staged_size = std::fs::metadata(&staged).unwrap().len();
            assert_eq!(listener.items().await, vec![staged]);
            assert!(store.contains("house.s01e01.mkv").unwrap());
            // exactly one source was taken; the other is untouched
            match (first.exists(), second.exists()) {
                (false, true) => assert_eq!(staged_size, 150 * 1024),
                (true, false) => assert_eq!(staged_size, 160 * 1024),
                other => panic!("unexpected sources left: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_existing_destination_aborts() {
        let f = fixture(TransferMode::Move);
        let path = f.watch.join("show.s01e03.mkv");
        write_file(&path, 150 * 1024);
        std::fs::create_dir_all(&f.staging).unwrap();
        std::fs::write(f.staging.join("show.s01e03.mkv"), b"existing").unwrap();

        let err = f
            .handler
            .handle_file("show.s01e03.mkv", &path)
            .await
            .unwrap_err();

        assert!(matches!(err, FileError::DestinationExists { .. }));
        assert!(path.exists());
        assert!(f.listener.items().await.is_empty());
        assert!(!f.store.contains("show.s01e03.mkv").unwrap());
    }
}
