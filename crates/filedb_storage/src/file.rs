//! Whole-file storage with in-process and cross-process exclusion.

use crate::error::StorageResult;
use crate::fs::{remove_file_if_exists, with_suffix, write_atomic};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// A file that is always read and written as a whole.
///
/// # Concurrency
///
/// - Within the process, every access is serialized by an internal mutex.
/// - Across processes, readers take a shared and writers an exclusive
///   advisory lock on a sidecar `<file>.lock`. The data file itself is
///   replaced by rename, so the lock cannot live on it.
///
/// # Example
///
/// ```no_run
/// use filedb_storage::StorageFile;
/// use std::path::Path;
///
/// let file = StorageFile::new(Path::new("Data.json"));
/// file.write(b"{}").unwrap();
/// assert_eq!(file.read().unwrap(), Some(b"{}".to_vec()));
/// ```
#[derive(Debug)]
pub struct StorageFile {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl StorageFile {
    /// Creates a handle for the file at `path`. Nothing is touched on disk.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock_path: with_suffix(path, ".lock"),
            guard: Mutex::new(()),
        }
    }

    /// Returns the path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the sidecar lock file.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Returns whether the data file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads the whole file. Returns `None` if it does not exist.
    pub fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        let _guard = self.guard.lock();

        if !self.exists() {
            return Ok(None);
        }

        let lock = self.open_lock_file()?;
        FileExt::lock_shared(&lock)?;
        let data = fs::read(&self.path)?;
        FileExt::unlock(&lock)?;

        Ok(Some(data))
    }

    /// Replaces the whole file with `data`.
    ///
    /// The parent directory must exist.
    pub fn write(&self, data: &[u8]) -> StorageResult<()> {
        let _guard = self.guard.lock();

        let lock = self.open_lock_file()?;
        FileExt::lock_exclusive(&lock)?;
        let result = write_atomic(&self.path, data);
        FileExt::unlock(&lock)?;

        result
    }

    /// Returns whether nobody, in this process or another, is currently
    /// reading or writing the file.
    pub fn is_free(&self) -> StorageResult<bool> {
        let Some(_guard) = self.guard.try_lock() else {
            return Ok(false);
        };

        if !self.lock_path.exists() {
            return Ok(true);
        }

        let lock = self.open_lock_file()?;
        if lock.try_lock_exclusive().is_err() {
            return Ok(false);
        }
        FileExt::unlock(&lock)?;

        Ok(true)
    }

    /// Deletes the data file and its lock file.
    pub fn remove(&self) -> StorageResult<()> {
        let _guard = self.guard.lock();
        remove_file_if_exists(&self.path)?;
        remove_file_if_exists(&self.lock_path)?;
        Ok(())
    }

    fn open_lock_file(&self) -> StorageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        Ok(file)
    }
}
