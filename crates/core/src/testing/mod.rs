//! Testing utilities and mock implementations.
//!
//! Mocks stand in for every external collaborator of the pipeline (feed and
//! search sources, the download trigger, file handlers) so whole flows can be
//! exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediamanager_core::testing::{MockFeedParser, RecordingListener, fixtures};
//!
//! let parser = MockFeedParser::new("tracker");
//! parser.set_items(vec![fixtures::feed_item("1", "House.S03E01.720p")]).await;
//!
//! let listener = RecordingListener::new();
//! scheduler.add_parser(Arc::new(parser)).await;
//! scheduler.add_listener(Arc::new(listener)).await;
//! ```

mod mock_download_trigger;
mod mock_feed_parser;
mod mock_search_parser;
mod recording;

pub use mock_download_trigger::MockDownloadTrigger;
pub use mock_feed_parser::MockFeedParser;
pub use mock_search_parser::MockSearchParser;
pub use recording::{RecordingFileHandler, RecordingListener};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::arbiter::{ArbiterConfig, QualityArbiter};
    use crate::models::{Episode, FeedItem, Name, QualityTiers};
    use crate::store::{ShowStore, SqliteStore};

    /// A feed item with a magnet link derived from `id`.
    pub fn feed_item(id: &str, title: &str) -> FeedItem {
        FeedItem::new(
            id,
            title,
            format!("magnet:?xt=urn:btih:{}", id),
            "mock-source",
        )
    }

    /// Fresh in-memory store.
    pub fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::in_memory().expect("in-memory store"))
    }

    /// Marks `name` as DESIRED in the show store.
    pub fn desire(store: &SqliteStore, name: &Name) {
        store
            .upsert(&Episode::desired(name.clone()))
            .expect("upsert desired episode");
    }

    /// Arbiter with the given tiers backed by `store`.
    pub fn arbiter(
        store: &Arc<SqliteStore>,
        primary: &[&str],
        secondary: &[&str],
        timeout: Duration,
    ) -> Arc<QualityArbiter> {
        let config = ArbiterConfig {
            tiers: QualityTiers::new(primary.iter().copied(), secondary.iter().copied()),
            primary_quality_timeout: timeout,
        };
        Arc::new(QualityArbiter::new(config, store.clone(), store.clone()))
    }

    /// Writes a file of `size` bytes with non-uniform content.
    pub fn write_file(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(path, content).expect("write fixture file");
    }
}
