//! Persistence of a table's record set.
//!
//! A table directory looks like this:
//!
//! ```text
//! Tables/<id>/
//! ├─ Table.info
//! ├─ Data.json          # the storage object
//! ├─ Data.json.lock     # advisory lock sidecar
//! └─ BackUps/
//!    └─ Data.json.<millis>-<seq>.bak
//! ```
//!
//! The data file holds one [`StorageObject`]: metadata describing the last
//! write plus the full list of records. A file whose declared item count
//! disagrees with its contents, or that cannot be decoded, is corrupt and
//! gets replaced by the most recent backup that validates.

use crate::error::{CoreError, CoreResult};
use crate::info::host_name;
use crate::types::Record;
use chrono::{DateTime, Utc};
use filedb_codec::Format;
use filedb_storage::{Backup, BackupSet, StorageFile};
use serde::{Deserialize, Serialize};
use std::any;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stem of every table data file.
pub const DATA_FILE_STEM: &str = "Data";

/// Name of the backup directory inside a table directory.
pub const BACKUP_DIR: &str = "BackUps";

/// Returns the data file name for `format`, e.g. `Data.json`.
#[must_use]
pub fn data_file_name(format: Format) -> String {
    format!("{DATA_FILE_STEM}.{}", format.extension())
}

/// An entity whose data lives in a directory on disk.
pub trait PersistenceBacked {
    /// Returns the format of the entity's data file.
    fn format(&self) -> Format;

    /// Returns the directory holding the entity's files.
    fn directory(&self) -> PathBuf;

    /// Points the entity at a new directory. The entity must be shut down.
    fn set_directory(&self, directory: &Path) -> CoreResult<()>;
}

/// Description of the last write of a data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Host that wrote the file.
    pub modified_by: String,
    /// When the file was written.
    pub last_modified: DateTime<Utc>,
    /// Type name of the stored records.
    pub source_type: String,
    /// Number of stored records.
    pub stored_items: u64,
}

/// The stored records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceData<I> {
    /// The records, absent when the file was written empty.
    pub items: Option<I>,
}

/// The decoded contents of a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObject<I> {
    /// Write metadata.
    pub metadata: SourceMetadata,
    /// Record payload.
    pub data: SourceData<I>,
}

impl<T> StorageObject<Vec<T>> {
    /// Returns the number of records actually stored.
    #[must_use]
    pub fn actual_items(&self) -> usize {
        self.data.items.as_ref().map_or(0, Vec::len)
    }

    /// Takes the records out, empty when absent.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.data.items.unwrap_or_default()
    }
}

/// The data file and backups of one table in one format.
#[derive(Debug)]
pub struct TableSource<T> {
    table: String,
    format: Format,
    directory: PathBuf,
    file: StorageFile,
    backups: BackupSet,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> TableSource<T> {
    /// Creates a source for `table` in `directory`. Nothing is touched on disk.
    #[must_use]
    pub fn new(table: &str, directory: &Path, format: Format, backup_retention: usize) -> Self {
        let file_name = data_file_name(format);
        Self {
            table: table.to_string(),
            format,
            directory: directory.to_path_buf(),
            file: StorageFile::new(&directory.join(&file_name)),
            backups: BackupSet::new(&directory.join(BACKUP_DIR), &file_name, backup_retention),
            _marker: PhantomData,
        }
    }

    /// Returns the table identifier.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the format of the data file.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns the table directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Returns whether the data file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    /// Prepares the data file.
    ///
    /// An existing file is validated and, if corrupt, restored from the most
    /// recent backup that validates. A missing file is created empty.
    pub fn initialize(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.directory)?;

        if !self.file.exists() {
            debug!(table = %self.table, path = %self.path().display(), "creating empty source");
            return self.persist(&[]);
        }

        match self.validate() {
            Ok(items) => {
                debug!(table = %self.table, items, "source is valid");
                Ok(())
            }
            Err(e) if e.is_corruption() => {
                warn!(table = %self.table, error = %e, "source is corrupt, restoring from backups");
                self.restore_from_backups()
            }
            Err(e) => Err(e),
        }
    }

    /// Checks that the data file decodes and holds as many items as declared.
    ///
    /// Returns the number of items.
    pub fn validate(&self) -> CoreResult<usize> {
        let object = self.read_object()?;
        Ok(object.actual_items())
    }

    /// Reads all records. A missing file holds none.
    pub fn load(&self) -> CoreResult<Vec<T>> {
        if !self.file.exists() {
            return Ok(Vec::new());
        }
        let records = self.read_object()?.into_items();
        debug!(table = %self.table, items = records.len(), "loaded source");
        Ok(records)
    }

    /// Replaces the data file with `records`.
    pub fn persist(&self, records: &[T]) -> CoreResult<()> {
        let object = StorageObject {
            metadata: SourceMetadata {
                modified_by: host_name(),
                last_modified: Utc::now(),
                source_type: any::type_name::<T>().to_string(),
                stored_items: records.len() as u64,
            },
            data: SourceData {
                items: Some(records),
            },
        };
        let bytes = self.format.encode(&object)?;
        self.file.write(&bytes)?;
        debug!(table = %self.table, items = records.len(), "persisted source");
        Ok(())
    }

    /// Copies the data file into the backup set.
    pub fn create_backup(&self) -> CoreResult<Option<Backup>> {
        Ok(self.backups.create(&self.file)?)
    }

    /// Lists the retained backups, most recent first.
    pub fn backups(&self) -> CoreResult<Vec<Backup>> {
        Ok(self.backups.list()?)
    }

    /// Restores the most recent backup. Returns it, or `None` if there is none.
    pub fn restore_latest_backup(&self) -> CoreResult<Option<Backup>> {
        match self.backups.latest()? {
            Some(backup) => self.restore_backup(&backup).map(|()| Some(backup)),
            None => Ok(None),
        }
    }

    /// Restores the oldest retained backup. Returns it, or `None` if there is none.
    pub fn restore_earliest_backup(&self) -> CoreResult<Option<Backup>> {
        match self.backups.earliest()? {
            Some(backup) => self.restore_backup(&backup).map(|()| Some(backup)),
            None => Ok(None),
        }
    }

    /// Overwrites the data file with `backup` and validates the result.
    pub fn restore_backup(&self, backup: &Backup) -> CoreResult<()> {
        self.backups.restore(backup, &self.file)?;
        let items = self.validate()?;
        info!(
            table = %self.table,
            backup = %backup.path().display(),
            items,
            "restored backup"
        );
        Ok(())
    }

    /// Returns whether no one is reading or writing the data file.
    pub fn is_free(&self) -> CoreResult<bool> {
        Ok(self.file.is_free()?)
    }

    /// Deletes the data file, its lock file and its backups.
    pub fn clear(&self) -> CoreResult<()> {
        self.file.remove()?;
        let removed = self.backups.delete_all()?;
        debug!(table = %self.table, backups = removed, "cleared source");
        Ok(())
    }

    /// Returns an independent copy of `record`.
    pub fn clone_record(&self, record: &T) -> CoreResult<T> {
        Ok(self.format.round_trip(record)?)
    }

    /// Returns independent copies of `records`.
    pub fn clone_records(&self, records: &[T]) -> CoreResult<Vec<T>> {
        records.iter().map(|r| self.clone_record(r)).collect()
    }

    fn read_object(&self) -> CoreResult<StorageObject<Vec<T>>> {
        let Some(bytes) = self.file.read()? else {
            return Err(CoreError::invalid_source(self.path(), "data file is missing"));
        };
        let object: StorageObject<Vec<T>> = self
            .format
            .decode(&bytes)
            .map_err(|e| CoreError::invalid_source(self.path(), e.to_string()))?;

        let actual = object.actual_items();
        if object.metadata.stored_items != actual as u64 {
            return Err(CoreError::invalid_source(
                self.path(),
                format!(
                    "declares {} items but holds {actual}",
                    object.metadata.stored_items
                ),
            ));
        }
        Ok(object)
    }

    fn restore_from_backups(&self) -> CoreResult<()> {
        let backups = self.backups.list()?;
        let mut attempted = 0;

        for backup in &backups {
            attempted += 1;
            match self.restore_backup(backup) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        table = %self.table,
                        backup = %backup.path().display(),
                        error = %e,
                        "backup is unusable"
                    );
                }
            }
        }

        Err(CoreError::CouldNotRestoreBackup {
            table: self.table.clone(),
            attempted,
        })
    }
}
