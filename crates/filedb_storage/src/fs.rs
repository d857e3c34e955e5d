//! File system helpers shared by storage files and backup sets.

use crate::error::{StorageError, StorageResult};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Returns `path` with `suffix` appended to its file name.
///
/// `Data.json` + `.tmp` becomes `Data.json.tmp`.
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Replaces the contents of `path` with `data` atomically.
///
/// Uses the write-then-rename pattern:
/// 1. Write to `<path>.tmp`
/// 2. Sync the temporary file
/// 3. Rename it over `path`
/// 4. Sync the parent directory so the rename is durable
///
/// A crash at any point leaves either the old or the new contents at `path`,
/// never a mix of both.
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp_path = with_suffix(path, ".tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }

    Ok(())
}

/// Syncs a directory so that entry creations, renames and deletions are durable.
#[cfg(unix)]
pub fn sync_directory(path: &Path) -> StorageResult<()> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

/// Syncs a directory so that entry creations, renames and deletions are durable.
#[cfg(not(unix))]
pub fn sync_directory(_path: &Path) -> StorageResult<()> {
    // NTFS journals metadata; directories cannot be opened for fsync.
    Ok(())
}

/// Recursively copies the contents of `from` into `to`.
///
/// `to` is created if missing. When `overwrite` is false an existing
/// destination file aborts the copy with [`StorageError::AlreadyExists`].
///
/// Returns the number of files copied.
pub fn copy_dir_all(from: &Path, to: &Path, overwrite: bool) -> StorageResult<u64> {
    fs::create_dir_all(to)?;

    let mut copied = 0;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let destination = to.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&source, &destination, overwrite)?;
        } else {
            if !overwrite && destination.exists() {
                return Err(StorageError::AlreadyExists { path: destination });
            }
            fs::copy(&source, &destination)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Removes `path` if it exists. Returns whether something was removed.
pub fn remove_file_if_exists(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
