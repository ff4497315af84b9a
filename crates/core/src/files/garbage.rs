//! Cleanup of leftover download artifacts.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::error::FileError;
use super::handler::FileHandler;

/// Deletes files with garbage extensions (`nfo`, `txt`, ...) and empty
/// directories. Non-empty directories are left alone.
pub struct GarbageFileHandler {
    extensions: Vec<String>,
}

impl GarbageFileHandler {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    async fn is_empty_dir(path: &Path) -> Result<bool, FileError> {
        let mut entries = fs::read_dir(path).await?;
        Ok(entries.next_entry().await?.is_none())
    }
}

#[async_trait]
impl FileHandler for GarbageFileHandler {
    fn name(&self) -> &str {
        "garbage"
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    async fn handle_file(&self, relative_path: &str, path: &Path) -> Result<(), FileError> {
        let delete_failed = |e| FileError::DeleteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if path.is_dir() {
            if !Self::is_empty_dir(path).await? {
                debug!(path = relative_path, "Keeping non-empty directory");
                return Ok(());
            }
            fs::remove_dir(path).await.map_err(delete_failed)?;
        } else {
            fs::remove_file(path).await.map_err(delete_failed)?;
        }

        debug!(path = relative_path, "Deleted garbage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_deletes_garbage_file_and_empty_dir() {
        let temp = TempDir::new().unwrap();
        let nfo = temp.path().join("release.nfo");
        let empty = temp.path().join("Release.Dir");
        std::fs::write(&nfo, b"info").unwrap();
        std::fs::create_dir(&empty).unwrap();

        let handler = GarbageFileHandler::new([".NFO", "txt"]);
        assert_eq!(handler.extensions(), vec!["nfo", "txt"]);

        handler.handle_file("release.nfo", &nfo).await.unwrap();
        handler.handle_file("Release.Dir", &empty).await.unwrap();

        assert!(!nfo.exists());
        assert!(!empty.exists());
    }

    #[tokio::test]
    async fn test_keeps_non_empty_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Release.Dir");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("show.s01e01.mkv"), b"x").unwrap();

        GarbageFileHandler::new(["nfo"])
            .handle_file("Release.Dir", &dir)
            .await
            .unwrap();

        assert!(dir.exists());
    }
}
