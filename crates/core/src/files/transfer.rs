//! Move/copy with checksum verification.
//!
//! The checksum is computed before and after the transfer. A mismatch is
//! reported but the transfer stands: nothing is rolled back.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};

use crate::metrics;

use super::error::FileError;

const BUFFER_SIZE: usize = 64 * 1024;

/// Checksum algorithm used for transfer verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    #[default]
    Md5,
    Sha256,
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumType::Md5 => f.write_str("md5"),
            ChecksumType::Sha256 => f.write_str("sha256"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Move,
    Copy,
}

impl TransferMode {
    fn verb(&self) -> &'static str {
        match self {
            TransferMode::Move => "moving",
            TransferMode::Copy => "copying",
        }
    }
}

/// Result of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub destination: PathBuf,
    pub size_bytes: u64,
    pub source_checksum: String,
    pub destination_checksum: String,
}

impl Transfer {
    pub fn verified(&self) -> bool {
        self.source_checksum == self.destination_checksum
    }
}

/// Performs single-file transfers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransfer {
    checksum: ChecksumType,
    /// Runs between the write and the destination checksum.
    #[cfg(test)]
    after_write: Option<fn(&Path)>,
}

impl FileTransfer {
    pub fn new(checksum: ChecksumType) -> Self {
        Self {
            checksum,
            ..Self::default()
        }
    }

    pub fn checksum_type(&self) -> ChecksumType {
        self.checksum
    }

    /// Transfers `source` to `destination`, creating parent directories.
    ///
    /// Fails with [`FileError::DestinationExists`] if the destination is
    /// already present. The destination is created exclusively (hard link or
    /// `create_new`), so two concurrent transfers to the same path cannot
    /// both succeed.
    pub async fn transfer(
        &self,
        source: &Path,
        destination: &Path,
        mode: TransferMode,
    ) -> Result<Transfer, FileError> {
        if !source.exists() {
            return Err(FileError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        if destination.exists() {
            return Err(FileError::DestinationExists {
                path: destination.to_path_buf(),
            });
        }

        ensure_parent_dirs(destination).await?;

        let source_checksum = self.calculate_checksum(source).await?;
        debug!(
            source = %source.display(),
            destination = %destination.display(),
            checksum = %source_checksum,
            algorithm = %self.checksum,
            "{} file",
            mode.verb()
        );

        match mode {
            TransferMode::Copy => {
                copy_file(source, destination).await?;
            }
            TransferMode::Move => {
                if !try_link(source, destination).await? {
                    copy_file(source, destination).await?;
                }
                fs::remove_file(source)
                    .await
                    .map_err(|e| FileError::DeleteFailed {
                        path: source.to_path_buf(),
                        source: e,
                    })?;
            }
        }

        #[cfg(test)]
        if let Some(hook) = self.after_write {
            hook(destination);
        }

        let size_bytes = fs::metadata(destination).await?.len();
        let destination_checksum = self.calculate_checksum(destination).await?;

        let transfer = Transfer {
            destination: destination.to_path_buf(),
            size_bytes,
            source_checksum,
            destination_checksum,
        };

        if !transfer.verified() {
            metrics::INTEGRITY_MISMATCHES.inc();
            warn!(
                source = %source.display(),
                destination = %destination.display(),
                expected = %transfer.source_checksum,
                actual = %transfer.destination_checksum,
                algorithm = %self.checksum,
                "Checksum mismatch after {} file",
                mode.verb()
            );
        }

        Ok(transfer)
    }

    /// Calculates the checksum of a file using the configured algorithm.
    pub async fn calculate_checksum(&self, path: &Path) -> Result<String, FileError> {
        let checksum_failed = |e| FileError::ChecksumCalculationFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let file = File::open(path).await.map_err(checksum_failed)?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut buffer = vec![0u8; BUFFER_SIZE];

        match self.checksum {
            ChecksumType::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let bytes_read = reader.read(&mut buffer).await.map_err(checksum_failed)?;
                    if bytes_read == 0 {
                        break;
                    }
                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
            ChecksumType::Md5 => {
                let mut context = md5::Context::new();
                loop {
                    let bytes_read = reader.read(&mut buffer).await.map_err(checksum_failed)?;
                    if bytes_read == 0 {
                        break;
                    }
                    context.consume(&buffer[..bytes_read]);
                }
                Ok(format!("{:x}", context.compute()))
            }
        }
    }
}

/// Links `destination` to `source`. Linking fails instead of replacing an
/// existing destination. Returns `false` when the filesystem cannot link
/// across the two paths and the caller has to copy.
async fn try_link(source: &Path, destination: &Path) -> Result<bool, FileError> {
    match fs::hard_link(source, destination).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(FileError::DestinationExists {
            path: destination.to_path_buf(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(FileError::SourceNotFound {
            path: source.to_path_buf(),
        }),
        // EXDEV is 18 and EPERM is 1 on Linux
        Err(e)
            if e.kind() == ErrorKind::CrossesDevices
                || e.kind() == ErrorKind::Unsupported
                || matches!(e.raw_os_error(), Some(18) | Some(1)) =>
        {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                error = %e,
                "Cannot link, falling back to copy"
            );
            Ok(false)
        }
        Err(e) => Err(FileError::move_failed(
            source.to_path_buf(),
            destination.to_path_buf(),
            e,
        )),
    }
}

async fn copy_file(source: &Path, destination: &Path) -> Result<u64, FileError> {
    let copy_failed =
        |e| FileError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e);

    let source_file = File::open(source).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            FileError::SourceNotFound {
                path: source.to_path_buf(),
            }
        } else {
            FileError::Io(e)
        }
    })?;
    let dest_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                FileError::DestinationExists {
                    path: destination.to_path_buf(),
                }
            } else {
                copy_failed(e)
            }
        })?;

    let result = write_all(source_file, dest_file).await.map_err(copy_failed);
    if result.is_err() {
        // the destination was created by this call, so a partial copy is ours to remove
        let _ = fs::remove_file(destination).await;
    }
    result
}

async fn write_all(source: File, destination: File) -> std::io::Result<u64> {
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, destination);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total_bytes = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read]).await?;
        total_bytes += bytes_read as u64;
    }

    writer.flush().await?;
    Ok(total_bytes)
}

/// Creates parent directories for a path.
pub(crate) async fn ensure_parent_dirs(path: &Path) -> Result<(), FileError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FileError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
    }
    Ok(())
}
