//! Mock download trigger for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::download::{DownloadError, DownloadTrigger};

/// Records every link handed to it; optionally fails.
#[derive(Debug, Default)]
pub struct MockDownloadTrigger {
    links: RwLock<Vec<String>>,
    fail: AtomicBool,
}

impl MockDownloadTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger whose every fetch fails with a connection error.
    pub fn failing() -> Self {
        let trigger = Self::new();
        trigger.set_failing(true);
        trigger
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Links fetched so far, failed attempts included.
    pub async fn links(&self) -> Vec<String> {
        self.links.read().await.clone()
    }
}

#[async_trait]
impl DownloadTrigger for MockDownloadTrigger {
    async fn fetch(&self, link: &str) -> Result<(), DownloadError> {
        self.links.write().await.push(link.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(DownloadError::ConnectionFailed("mock failure".to_string()));
        }
        Ok(())
    }
}
