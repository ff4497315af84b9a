//! Error types for file handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while handling a landed file.
#[derive(Debug, Error)]
pub enum FileError {
    /// Source file not found.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Destination already exists; files are never overwritten.
    #[error("Destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// Failed to create destination directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to move/rename file.
    #[error("Failed to move file from {source} to {destination}")]
    MoveFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to copy file.
    #[error("Failed to copy file from {source} to {destination}")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to calculate checksum.
    #[error("Failed to calculate checksum for {path}")]
    ChecksumCalculationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to delete a file or directory.
    #[error("Failed to delete {path}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileError {
    /// Creates a copy failed error.
    pub fn copy_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::CopyFailed {
            source,
            destination,
            error,
        }
    }

    /// Creates a move failed error.
    pub fn move_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::MoveFailed {
            source,
            destination,
            error,
        }
    }
}
