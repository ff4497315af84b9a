use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use super::retry::Retryable;

/// Errors raised while triggering a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status} fetching {link}")]
    Http { link: String, status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to write {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout
        } else if e.is_connect() {
            DownloadError::ConnectionFailed(e.to_string())
        } else {
            DownloadError::Transport(e.to_string())
        }
    }
}

impl Retryable for DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::ConnectionFailed(_)
            | DownloadError::Timeout
            | DownloadError::Transport(_) => true,
            DownloadError::Http { status, .. } => *status >= 500 || *status == 429,
            DownloadError::WriteFailed { .. } => false,
        }
    }
}

/// Starts retrieval of an accepted link.
///
/// Completion is asynchronous relative to the caller: a successful return
/// only means the retrieval was handed off.
#[async_trait]
pub trait DownloadTrigger: Send + Sync {
    async fn fetch(&self, link: &str) -> Result<(), DownloadError>;
}
