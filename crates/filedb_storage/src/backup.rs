//! Bounded sets of file snapshots.
//!
//! A [`BackupSet`] keeps byte-for-byte copies of one storage file in a
//! backup directory:
//!
//! ```text
//! <dir>/BackUps/
//! ├─ Data.json.1718035200123-000.bak
//! ├─ Data.json.1718035200123-001.bak
//! └─ Data.cbor.1718035299000-000.bak
//! ```
//!
//! The name carries the source file name, the creation time in Unix
//! milliseconds and a sequence number for backups taken within the same
//! millisecond. Several sets can share one directory because each set only
//! looks at names starting with its own source file name.

use crate::error::{StorageError, StorageResult};
use crate::file::StorageFile;
use crate::fs::{remove_file_if_exists, write_atomic};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number of backups kept when nothing else is configured.
pub const DEFAULT_RETENTION: usize = 5;

const BACKUP_SUFFIX: &str = ".bak";

/// A single snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    path: PathBuf,
    millis: i64,
    sequence: u32,
}

impl Backup {
    /// Returns the path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns when the snapshot was taken.
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis).unwrap_or_default()
    }

    /// Returns the size of the snapshot in bytes.
    pub fn size(&self) -> StorageResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn order_key(&self) -> (i64, u32) {
        (self.millis, self.sequence)
    }
}

/// The retained snapshots of one storage file.
///
/// Creating a backup beyond `retention` evicts the oldest ones.
#[derive(Debug)]
pub struct BackupSet {
    dir: PathBuf,
    prefix: String,
    retention: usize,
    guard: Mutex<()>,
}

impl BackupSet {
    /// Creates a backup set for the file named `source_name` in `dir`.
    ///
    /// A retention of zero is treated as one.
    #[must_use]
    pub fn new(dir: &Path, source_name: &str, retention: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: format!("{source_name}."),
            retention: retention.max(1),
            guard: Mutex::new(()),
        }
    }

    /// Returns the backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the maximum number of retained backups.
    #[must_use]
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Snapshots `source`.
    ///
    /// Returns `None` without touching the set when the source file does
    /// not exist.
    pub fn create(&self, source: &StorageFile) -> StorageResult<Option<Backup>> {
        let Some(data) = source.read()? else {
            return Ok(None);
        };

        let _guard = self.guard.lock();
        fs::create_dir_all(&self.dir)?;

        let millis = Utc::now().timestamp_millis();
        let sequence = self
            .scan()?
            .iter()
            .filter(|b| b.millis == millis)
            .map(|b| b.sequence + 1)
            .max()
            .unwrap_or(0);

        let path = self
            .dir
            .join(format!("{}{millis:013}-{sequence:03}{BACKUP_SUFFIX}", self.prefix));
        write_atomic(&path, &data)?;

        let backup = Backup {
            path,
            millis,
            sequence,
        };
        self.evict()?;

        debug!(backup = %backup.path.display(), "created backup");
        Ok(Some(backup))
    }

    /// Lists the retained backups, most recent first.
    pub fn list(&self) -> StorageResult<Vec<Backup>> {
        let _guard = self.guard.lock();
        self.scan()
    }

    /// Returns the most recent backup.
    pub fn latest(&self) -> StorageResult<Option<Backup>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Returns the oldest retained backup.
    pub fn earliest(&self) -> StorageResult<Option<Backup>> {
        Ok(self.list()?.into_iter().last())
    }

    /// Overwrites `target` with the contents of `backup`.
    pub fn restore(&self, backup: &Backup, target: &StorageFile) -> StorageResult<()> {
        let data = {
            let _guard = self.guard.lock();
            match fs::read(&backup.path) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::BackupNotFound {
                        path: backup.path.clone(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        target.write(&data)?;
        debug!(backup = %backup.path.display(), target = %target.path().display(), "restored backup");
        Ok(())
    }

    /// Deletes every backup in the set. Returns how many were removed.
    pub fn delete_all(&self) -> StorageResult<usize> {
        let _guard = self.guard.lock();
        let mut deleted = 0;
        for backup in self.scan()? {
            if remove_file_if_exists(&backup.path)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn evict(&self) -> StorageResult<()> {
        for backup in self.scan()?.into_iter().skip(self.retention) {
            debug!(backup = %backup.path.display(), "evicting backup");
            remove_file_if_exists(&backup.path)?;
        }
        Ok(())
    }

    fn scan(&self) -> StorageResult<Vec<Backup>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some((millis, sequence)) = self.parse_name(name) {
                backups.push(Backup {
                    path: entry.path(),
                    millis,
                    sequence,
                });
            }
        }

        backups.sort_by_key(|b| std::cmp::Reverse(b.order_key()));
        Ok(backups)
    }

    fn parse_name(&self, name: &str) -> Option<(i64, u32)> {
        let stamp = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(BACKUP_SUFFIX)?;
        let (millis, sequence) = stamp.split_once('-')?;
        Some((millis.parse().ok()?, sequence.parse().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup(retention: usize) -> (tempfile::TempDir, StorageFile, BackupSet) {
        let temp = tempdir().unwrap();
        let source = StorageFile::new(&temp.path().join("Data.json"));
        let set = BackupSet::new(&temp.path().join("BackUps"), "Data.json", retention);
        (temp, source, set)
    }

    #[test]
    fn missing_source_creates_nothing() {
        let (_temp, source, set) = setup(3);
        assert!(set.create(&source).unwrap().is_none());
        assert!(set.list().unwrap().is_empty());
    }

    #[test]
    fn backups_are_listed_newest_first() {
        let (_temp, source, set) = setup(5);

        source.write(b"one").unwrap();
        let first = set.create(&source).unwrap().unwrap();
        source.write(b"two").unwrap();
        let second = set.create(&source).unwrap().unwrap();

        let listed = set.list().unwrap();
        assert_eq!(listed, vec![second.clone(), first.clone()]);
        assert_eq!(set.latest().unwrap(), Some(second));
        assert_eq!(set.earliest().unwrap(), Some(first));
    }

    #[test]
    fn retention_evicts_oldest() {
        let (_temp, source, set) = setup(2);

        for content in [b"a", b"b", b"c", b"d"] {
            source.write(content).unwrap();
            set.create(&source).unwrap();
        }

        let listed = set.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(fs::read(listed[0].path()).unwrap(), b"d");
        assert_eq!(fs::read(listed[1].path()).unwrap(), b"c");
    }

    #[test]
    fn zero_retention_keeps_one() {
        let (_temp, source, set) = setup(0);
        assert_eq!(set.retention(), 1);

        source.write(b"a").unwrap();
        set.create(&source).unwrap();
        source.write(b"b").unwrap();
        set.create(&source).unwrap();

        assert_eq!(set.list().unwrap().len(), 1);
    }

    #[test]
    fn restore_overwrites_source() {
        let (_temp, source, set) = setup(5);

        source.write(b"good").unwrap();
        let backup = set.create(&source).unwrap().unwrap();
        source.write(b"garbage").unwrap();

        set.restore(&backup, &source).unwrap();
        assert_eq!(source.read().unwrap(), Some(b"good".to_vec()));
    }

    #[test]
    fn restore_of_deleted_backup_fails() {
        let (_temp, source, set) = setup(5);
        source.write(b"x").unwrap();
        let backup = set.create(&source).unwrap().unwrap();
        fs::remove_file(backup.path()).unwrap();

        let result = set.restore(&backup, &source);
        assert!(matches!(result, Err(StorageError::BackupNotFound { .. })));
    }

    #[test]
    fn sets_sharing_a_directory_stay_apart() {
        let temp = tempdir().unwrap();
        let backups = temp.path().join("BackUps");
        let json = StorageFile::new(&temp.path().join("Data.json"));
        let cbor = StorageFile::new(&temp.path().join("Data.cbor"));
        let json_set = BackupSet::new(&backups, "Data.json", 5);
        let cbor_set = BackupSet::new(&backups, "Data.cbor", 5);

        json.write(b"j").unwrap();
        cbor.write(b"c").unwrap();
        json_set.create(&json).unwrap();
        cbor_set.create(&cbor).unwrap();

        assert_eq!(json_set.delete_all().unwrap(), 1);
        assert!(json_set.list().unwrap().is_empty());
        assert_eq!(cbor_set.list().unwrap().len(), 1);
    }

    #[test]
    fn foreign_files_are_ignored() {
        let (temp, source, set) = setup(5);
        let dir = temp.path().join("BackUps");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Data.json.notes.txt"), b"x").unwrap();
        fs::write(dir.join("Data.json.abc-def.bak"), b"x").unwrap();

        source.write(b"x").unwrap();
        set.create(&source).unwrap();

        assert_eq!(set.list().unwrap().len(), 1);
    }
}
