pub mod arbiter;
pub mod backfill;
pub mod config;
pub mod download;
pub mod feed;
pub mod files;
pub mod lifecycle;
pub mod listeners;
pub mod metrics;
pub mod models;
pub mod naming;
pub mod store;
pub mod testing;

pub use arbiter::{ArbiterConfig, QualityArbiter, RejectReason, Verdict};
pub use backfill::{BackfillConfig, BackfillManager, BackfillReport};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use download::{DownloadError, DownloadTrigger, RetryPolicy, WatchDirDownloader};
pub use feed::{
    FeedParser, FeedScheduler, ItemListener, ParserError, ParserRegistry, ParserSettings,
    SchedulerConfig, SearchParser,
};
pub use files::{
    Dispatcher, DirectoryWatcher, FileError, FileHandler, FileTransfer, GarbageFileHandler,
    MediaFileConfig, MediaFileHandler, WatcherConfig,
};
pub use lifecycle::{Lifecycle, LifecycleError, Managed};
pub use listeners::{CalendarListener, DownloadableItemListener, LibraryListener};
pub use models::{Episode, FeedItem, Name, Quality, QualityTier, QualityTiers, State};
pub use naming::EpisodeNameParser;
pub use store::{HandledFileStore, QualityStore, ShowStore, SqliteStore, StoreError};
