//! Reconciliation of landed media files into the library.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::feed::ItemListener;
use crate::files::{FileTransfer, TransferMode};
use crate::metrics;
use crate::models::{Episode, Name, State};
use crate::naming::EpisodeNameParser;
use crate::store::{ShowStore, StoreError};

/// Result of reconciling one landed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// File moved to this library path. The episode is marked EXISTS unless
    /// the store failed, which is logged.
    Placed(PathBuf),
    /// Filename did not parse; the file stays where it is.
    Unparsed,
    Failed,
}

/// Marks landed episodes as EXISTS and files them under
/// `{destination_root}/{title}/Season NN/`.
///
/// Never propagates a failure to the caller.
pub struct LibraryListener {
    parser: Arc<EpisodeNameParser>,
    shows: Arc<dyn ShowStore>,
    transfer: FileTransfer,
    destination_root: PathBuf,
}

impl LibraryListener {
    pub fn new(
        parser: Arc<EpisodeNameParser>,
        shows: Arc<dyn ShowStore>,
        transfer: FileTransfer,
        destination_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parser,
            shows,
            transfer,
            destination_root: destination_root.into(),
        }
    }

    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    pub async fn reconcile(&self, file: &Path) -> ReconcileOutcome {
        let outcome = self.try_reconcile(file).await;
        let label = match outcome {
            ReconcileOutcome::Placed(_) => "placed",
            ReconcileOutcome::Unparsed => "unparsed",
            ReconcileOutcome::Failed => "failed",
        };
        metrics::EPISODES_RECONCILED
            .with_label_values(&[label])
            .inc();
        outcome
    }

    fn record_existing(&self, name: &Name) -> Result<(), StoreError> {
        let episode = match self.shows.get(name)? {
            Some(existing) => existing.with_state(State::Exists),
            None => Episode::existing(name.clone()),
        };
        self.shows.upsert(&episode)
    }

    async fn try_reconcile(&self, file: &Path) -> ReconcileOutcome {
        let Some(filename) = file.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %file.display(), "Landed file has no usable name");
            return ReconcileOutcome::Failed;
        };

        let Some(parsed) = self.parser.parse_filename(filename) else {
            info!(path = %file.display(), "Could not parse landed file, leaving it in place");
            return ReconcileOutcome::Unparsed;
        };
        let name = parsed.name;

        // filing goes ahead even when the store is unavailable
        if let Err(e) = self.record_existing(&name) {
            warn!(name = %name, error = %e, "Failed to record landed episode");
        }

        let destination = self.destination_root.join(name.library_path(filename));
        match self
            .transfer
            .transfer(file, &destination, TransferMode::Move)
            .await
        {
            Ok(transfer) => {
                info!(
                    name = %name,
                    quality = %parsed.quality,
                    destination = %transfer.destination.display(),
                    "Episode filed into library"
                );
                ReconcileOutcome::Placed(transfer.destination)
            }
            Err(e) => {
                warn!(
                    name = %name,
                    path = %file.display(),
                    destination = %destination.display(),
                    error = %e,
                    "Failed to move episode into library"
                );
                ReconcileOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl ItemListener<PathBuf> for LibraryListener {
    async fn on_new_item(&self, item: PathBuf) {
        let outcome = self.reconcile(&item).await;
        debug!(path = %item.display(), outcome = ?outcome, "Reconciled landed file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        staging: PathBuf,
        library: PathBuf,
        store: Arc<SqliteStore>,
        listener: LibraryListener,
    }

    fn setup() -> Fixture {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        let library = temp.path().join("library");
        std::fs::create_dir_all(&staging).unwrap();
        let store = fixtures::store();
        let listener = LibraryListener::new(
            Arc::new(EpisodeNameParser::default()),
            store.clone(),
            FileTransfer::default(),
            &library,
        );
        Fixture {
            _temp: temp,
            staging,
            library,
            store,
            listener,
        }
    }

    #[tokio::test]
    async fn test_desired_episode_filed_and_marked_existing() {
        let f = setup();
        let name = Name::new("house", 3, 1);
        fixtures::desire(&f.store, &name);
        let landed = f.staging.join("house.s03e01.mkv");
        fixtures::write_file(&landed, 4096);

        let expected = f.library.join("house/Season 03/house.s03e01.mkv");
        assert_eq!(
            f.listener.reconcile(&landed).await,
            ReconcileOutcome::Placed(expected.clone())
        );
        assert!(expected.exists());
        assert!(!landed.exists());
        assert_eq!(f.store.get(&name).unwrap().unwrap().state, State::Exists);
    }

    #[tokio::test]
    async fn test_unknown_episode_created_as_existing() {
        let f = setup();
        let landed = f.staging.join("Special.E04.mkv");
        fixtures::write_file(&landed, 128);

        let outcome = f.listener.reconcile(&landed).await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Placed(f.library.join("special/Special.E04.mkv"))
        );
        let stored = f.store.get(&Name::new("special", 0, 4)).unwrap().unwrap();
        assert_eq!(stored.state, State::Exists);
    }

    struct UnavailableStore;

    impl ShowStore for UnavailableStore {
        fn get(&self, _name: &Name) -> Result<Option<Episode>, StoreError> {
            Err(StoreError::Database("database is locked".to_string()))
        }

        fn upsert(&self, _episode: &Episode) -> Result<(), StoreError> {
            Err(StoreError::Database("database is locked".to_string()))
        }

        fn insert_if_absent(&self, _episode: &Episode) -> Result<bool, StoreError> {
            Err(StoreError::Database("database is locked".to_string()))
        }

        fn list_by_state(&self, _state: State) -> Result<Vec<Episode>, StoreError> {
            Err(StoreError::Database("database is locked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_still_files_episode() {
        let f = setup();
        let listener = LibraryListener::new(
            Arc::new(EpisodeNameParser::default()),
            Arc::new(UnavailableStore),
            FileTransfer::default(),
            &f.library,
        );
        let landed = f.staging.join("house.s03e02.mkv");
        fixtures::write_file(&landed, 256);

        let expected = f.library.join("house/Season 03/house.s03e02.mkv");
        assert_eq!(
            listener.reconcile(&landed).await,
            ReconcileOutcome::Placed(expected.clone())
        );
        assert!(expected.exists());
        assert!(!landed.exists());
    }

    #[tokio::test]
    async fn test_unparsable_file_left_in_place() {
        let f = setup();
        let landed = f.staging.join("holiday video.mkv");
        fixtures::write_file(&landed, 128);

        assert_eq!(f.listener.reconcile(&landed).await, ReconcileOutcome::Unparsed);
        assert!(landed.exists());
    }

    #[tokio::test]
    async fn test_existing_destination_reported_not_raised() {
        let f = setup();
        let landed = f.staging.join("house.s03e01.mkv");
        fixtures::write_file(&landed, 128);
        fixtures::write_file(&f.library.join("house/Season 03/house.s03e01.mkv"), 64);

        f.listener.on_new_item(landed.clone()).await;
        assert_eq!(f.listener.reconcile(&landed).await, ReconcileOutcome::Failed);
        assert!(landed.exists());
    }
}
