//! Routes directory entries to exactly one handler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{trace, warn};

use super::handler::{file_extension, FileHandler};

/// Outcome of dispatching one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled by the named handler.
    Handled(String),
    /// The named handler failed; the error was logged.
    Failed(String),
    /// No handler matched.
    Unhandled,
}

/// Chooses a handler for each entry:
/// directory handler for directories, then the extension table, then the
/// default handler.
pub struct Dispatcher {
    root: PathBuf,
    by_extension: HashMap<String, Arc<dyn FileHandler>>,
    directory_handler: Option<Arc<dyn FileHandler>>,
    default_handler: Option<Arc<dyn FileHandler>>,
}

impl Dispatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            by_extension: HashMap::new(),
            directory_handler: None,
            default_handler: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers the handler for every extension it declares. A later
    /// registration for the same extension replaces the earlier one.
    pub fn add_handler(&mut self, handler: Arc<dyn FileHandler>) {
        for extension in handler.extensions() {
            self.register_extension(&extension, Arc::clone(&handler));
        }
    }

    pub fn register_extension(&mut self, extension: &str, handler: Arc<dyn FileHandler>) {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_lowercase(), handler);
    }

    pub fn set_directory_handler(&mut self, handler: Arc<dyn FileHandler>) {
        self.directory_handler = Some(handler);
    }

    pub fn set_default_handler(&mut self, handler: Arc<dyn FileHandler>) {
        self.default_handler = Some(handler);
    }

    /// Path relative to the root with `/` separators.
    pub fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn route(&self, relative_path: &str, is_dir: bool) -> Option<Arc<dyn FileHandler>> {
        if is_dir {
            if let Some(handler) = &self.directory_handler {
                return Some(Arc::clone(handler));
            }
        } else if let Some(handler) = self.by_extension.get(&file_extension(relative_path)) {
            return Some(Arc::clone(handler));
        }
        self.default_handler.clone()
    }

    /// Dispatches one entry. Handler errors are logged, never returned.
    pub async fn dispatch(&self, path: &Path) -> DispatchOutcome {
        let relative_path = self.relative_path(path);
        let Some(handler) = self.route(&relative_path, path.is_dir()) else {
            trace!(path = %relative_path, "Unhandled file");
            return DispatchOutcome::Unhandled;
        };

        match handler.handle_file(&relative_path, path).await {
            Ok(()) => DispatchOutcome::Handled(handler.name().to_string()),
            Err(e) => {
                warn!(
                    path = %relative_path,
                    handler = handler.name(),
                    error = %e,
                    "Error handling file"
                );
                DispatchOutcome::Failed(handler.name().to_string())
            }
        }
    }
}
