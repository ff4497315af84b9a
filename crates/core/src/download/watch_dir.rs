//! Download trigger writing into a torrent client's watch directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use crate::metrics;

use super::retry::RetryPolicy;
use super::types::{DownloadError, DownloadTrigger};

/// Fetches `.torrent` links over HTTP and writes magnet links verbatim,
/// placing the result in `watch_dir` for an external client to pick up.
pub struct WatchDirDownloader {
    watch_dir: PathBuf,
    client: Client,
    retry: RetryPolicy,
}

impl WatchDirDownloader {
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Transport(format!("HTTP client: {}", e)))?;

        Ok(Self {
            watch_dir: watch_dir.into(),
            client,
            retry,
        })
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Deterministic file name for a link, so a repeated trigger overwrites
    /// rather than duplicates.
    fn file_name(link: &str, extension: &str) -> String {
        let digest = Sha256::digest(link.as_bytes());
        let hex = format!("{:x}", digest);
        format!("{}.{}", &hex[..16], extension)
    }

    async fn fetch_bytes(&self, link: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(link)
            .send()
            .await
            .map_err(DownloadError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(DownloadError::Http {
                link: link.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(DownloadError::from_reqwest)?;
        Ok(body.to_vec())
    }

    /// Writes to a hidden temporary name and renames into place, so the
    /// client never sees a partial file.
    async fn write_atomically(
        &self,
        file_name: &str,
        contents: &[u8],
    ) -> Result<PathBuf, DownloadError> {
        let destination = self.watch_dir.join(file_name);
        let partial = self.watch_dir.join(format!(".{}.part", file_name));

        fs::create_dir_all(&self.watch_dir)
            .await
            .map_err(|e| write_failed(&self.watch_dir, e))?;
        fs::write(&partial, contents)
            .await
            .map_err(|e| write_failed(&partial, e))?;
        if let Err(e) = fs::rename(&partial, &destination).await {
            let _ = fs::remove_file(&partial).await;
            return Err(write_failed(&destination, e));
        }

        Ok(destination)
    }
}

fn write_failed(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::WriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl DownloadTrigger for WatchDirDownloader {
    async fn fetch(&self, link: &str) -> Result<(), DownloadError> {
        let result = if link.starts_with("magnet:") {
            self.write_atomically(&Self::file_name(link, "magnet"), link.as_bytes())
                .await
        } else {
            debug!(link = link, "Fetching torrent file");
            match self.retry.run("fetch_torrent", move || self.fetch_bytes(link)).await {
                Ok(bytes) => {
                    self.write_atomically(&Self::file_name(link, "torrent"), &bytes)
                        .await
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(path) => {
                metrics::DOWNLOADS_TRIGGERED.with_label_values(&["success"]).inc();
                info!(link = link, path = %path.display(), "Download handed to watch directory");
                Ok(())
            }
            Err(e) => {
                metrics::DOWNLOADS_TRIGGERED.with_label_values(&["failed"]).inc();
                Err(e)
            }
        }
    }
}
