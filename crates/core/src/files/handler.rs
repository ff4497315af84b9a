use async_trait::async_trait;
use std::path::Path;

use super::error::FileError;

/// Processes one entry appearing in the watched directory.
#[async_trait]
pub trait FileHandler: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &str;

    /// Lowercase extensions this handler registers for.
    fn extensions(&self) -> Vec<String> {
        Vec::new()
    }

    /// `relative_path` is relative to the watch root, `/`-separated.
    async fn handle_file(&self, relative_path: &str, path: &Path) -> Result<(), FileError>;
}

/// Lowercase text after the last `.` of the final path component, or an
/// empty string when there is none.
pub fn file_extension(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) => name[idx + 1..].to_lowercase(),
        None => String::new(),
    }
}

/// Final path component as a string.
pub(crate) fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
