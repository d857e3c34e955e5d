//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A backup that was asked for is no longer on disk.
    #[error("backup not found: {}", path.display())]
    BackupNotFound {
        /// Path of the missing backup.
        path: PathBuf,
    },

    /// A copy would overwrite an existing file.
    #[error("destination already exists: {}", path.display())]
    AlreadyExists {
        /// The existing destination file.
        path: PathBuf,
    },
}
