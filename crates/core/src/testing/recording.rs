//! Recording listener and file handler for testing.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::feed::{ItemListener, ParserError};
use crate::files::{FileError, FileHandler};

/// Listener that records everything it receives.
#[derive(Debug)]
pub struct RecordingListener<T> {
    items: RwLock<Vec<T>>,
    errors: RwLock<Vec<String>>,
}

impl<T> Default for RecordingListener<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Clone> RecordingListener<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn items(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    /// Names of the sources reported through `on_error`.
    pub async fn errors(&self) -> Vec<String> {
        self.errors.read().await.clone()
    }

    /// Polls until at least `count` items arrived or `timeout` elapsed.
    pub async fn wait_for_items(&self, count: usize, timeout: Duration) -> Vec<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let items = self.items().await;
            if items.len() >= count || tokio::time::Instant::now() >= deadline {
                return items;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl<T> ItemListener<T> for RecordingListener<T>
where
    T: Send + Sync + 'static,
{
    async fn on_new_item(&self, item: T) {
        self.items.write().await.push(item);
    }

    async fn on_error(&self, source: &str, _error: &ParserError) {
        self.errors.write().await.push(source.to_string());
    }
}

/// File handler that records relative paths instead of touching files.
#[derive(Debug)]
pub struct RecordingFileHandler {
    name: String,
    extensions: Vec<String>,
    fail: bool,
    handled: RwLock<Vec<String>>,
}

impl RecordingFileHandler {
    pub fn new<I, S>(name: &str, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.to_string(),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
            fail: false,
            handled: RwLock::new(Vec::new()),
        }
    }

    /// Handler that records the call and then fails.
    pub fn failing<I, S>(name: &str, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fail: true,
            ..Self::new(name, extensions)
        }
    }

    pub async fn handled(&self) -> Vec<String> {
        self.handled.read().await.clone()
    }
}

#[async_trait]
impl FileHandler for RecordingFileHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    async fn handle_file(&self, relative_path: &str, path: &Path) -> Result<(), FileError> {
        self.handled.write().await.push(relative_path.to_string());
        if self.fail {
            return Err(FileError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}
