//! Download directory handling: watching, dispatch, and file handlers.

mod dispatcher;
mod error;
mod garbage;
mod handler;
mod media;
mod transfer;
mod watcher;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::FileError;
pub use garbage::GarbageFileHandler;
pub use handler::{file_extension, FileHandler};
pub use media::{
    MediaFileConfig, MediaFileHandler, MediaRejection, DEFAULT_MEDIA_EXTENSIONS,
    DEFAULT_MIN_FILE_SIZE,
};
pub use transfer::{ChecksumType, FileTransfer, Transfer, TransferMode};
pub use watcher::{DirectoryWatcher, WatcherConfig};
