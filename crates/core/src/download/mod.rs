//! Download triggering.
//!
//! The core only decides *what* to fetch; a [`DownloadTrigger`] hands the
//! accepted link to whatever retrieves it. The bundled
//! [`WatchDirDownloader`] drops `.torrent`/`.magnet` files into a torrent
//! client's watch directory.

mod retry;
mod types;
mod watch_dir;

pub use retry::{RetryPolicy, Retryable};
pub use types::{DownloadError, DownloadTrigger};
pub use watch_dir::WatchDirDownloader;
