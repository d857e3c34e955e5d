//! Offline inspection of a database directory.
//!
//! The inspector works without knowing the record types: every data file is
//! decoded as [`serde_json::Value`]. Mutating operations refuse to run
//! while a database holds the directory.

use crate::database::{resolve, RelocateOptions, LOCK_FILE, TABLES_DIR};
use crate::error::{CoreError, CoreResult};
use crate::info::{DatabaseInfo, TableInfo};
use crate::source::TableSource;
use filedb_storage::fs::copy_dir_all;
use filedb_storage::{Backup, DEFAULT_RETENTION};
use fs2::FileExt;
use serde_json::Value;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of verifying one data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// The file decodes and holds as many items as it declares.
    Valid {
        /// Number of stored records.
        items: usize,
    },
    /// There is no data file.
    Missing,
    /// The file cannot be used.
    Corrupt {
        /// What is wrong with it.
        reason: String,
    },
}

impl SourceStatus {
    /// Returns whether the data file is usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid { items } => write!(f, "ok ({items} records)"),
            Self::Missing => write!(f, "missing"),
            Self::Corrupt { reason } => write!(f, "corrupt: {reason}"),
        }
    }
}

/// Verification result of one table.
#[derive(Debug, Clone)]
pub struct TableReport {
    /// The table's info record.
    pub info: TableInfo,
    /// The table directory.
    pub directory: PathBuf,
    /// State of the data file.
    pub status: SourceStatus,
    /// Number of retained backups.
    pub backups: usize,
}

/// Which backup to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupChoice {
    /// The most recent backup.
    Latest,
    /// The oldest retained backup.
    Earliest,
    /// Position in the most-recent-first listing.
    Index(usize),
}

/// Read-mostly view of a stopped database directory.
#[derive(Debug, Clone)]
pub struct DatabaseInspector {
    root: PathBuf,
}

impl DatabaseInspector {
    /// Creates an inspector for the directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the inspected directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads the database info record.
    pub fn info(&self) -> CoreResult<DatabaseInfo> {
        DatabaseInfo::read(&self.root)?.ok_or_else(|| {
            CoreError::invalid_info_file(
                DatabaseInfo::path(&self.root),
                "not a database directory",
            )
        })
    }

    /// Lists the tables found under `Tables/`, sorted by identifier.
    ///
    /// Directories without a `Table.info` are skipped.
    pub fn tables(&self) -> CoreResult<Vec<TableInfo>> {
        let dir = self.root.join(TABLES_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut tables = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match TableInfo::read(&entry.path())? {
                Some(info) => tables.push(info),
                None => debug!(path = %entry.path().display(), "skipping directory without table info"),
            }
        }
        tables.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(tables)
    }

    /// Returns the info record of `table`.
    pub fn table(&self, table: &str) -> CoreResult<TableInfo> {
        TableInfo::read(&self.table_dir(table))?.ok_or_else(|| CoreError::table_not_found(table))
    }

    /// Verifies the data file of `table`.
    pub fn verify_table(&self, table: &str) -> CoreResult<TableReport> {
        let info = self.table(table)?;
        let source = self.source(&info);

        let status = if !source.exists() {
            SourceStatus::Missing
        } else {
            match source.validate() {
                Ok(items) => SourceStatus::Valid { items },
                Err(e) if e.is_corruption() => SourceStatus::Corrupt {
                    reason: e.to_string(),
                },
                Err(e) => return Err(e),
            }
        };

        Ok(TableReport {
            directory: self.table_dir(table),
            backups: source.backups()?.len(),
            status,
            info,
        })
    }

    /// Verifies every table.
    pub fn verify(&self) -> CoreResult<Vec<TableReport>> {
        self.tables()?
            .iter()
            .map(|info| self.verify_table(&info.identifier))
            .collect()
    }

    /// Lists the backups of `table`, most recent first.
    pub fn backups(&self, table: &str) -> CoreResult<Vec<Backup>> {
        let info = self.table(table)?;
        self.source(&info).backups()
    }

    /// Replaces the data file of `table` with the chosen backup.
    ///
    /// Fails while a database runs in this directory.
    pub fn restore(&self, table: &str, choice: BackupChoice) -> CoreResult<Backup> {
        let _guard = lock_offline(&self.root)?;
        let info = self.table(table)?;
        let source = self.source(&info);
        let backups = source.backups()?;

        let chosen = match choice {
            BackupChoice::Latest => backups.first(),
            BackupChoice::Earliest => backups.last(),
            BackupChoice::Index(index) => backups.get(index),
        }
        .cloned()
        .ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "table {table} has {} backups, none matches {choice:?}",
                backups.len()
            ))
        })?;

        source.restore_backup(&chosen)?;
        Ok(chosen)
    }

    /// Reads the records of `table`.
    pub fn records(&self, table: &str) -> CoreResult<Vec<Value>> {
        let info = self.table(table)?;
        self.source(&info).load()
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(TABLES_DIR).join(table)
    }

    fn source(&self, info: &TableInfo) -> TableSource<Value> {
        TableSource::new(
            &info.identifier,
            &self.table_dir(&info.identifier),
            info.format,
            DEFAULT_RETENTION,
        )
    }
}

/// Moves a stopped database tree from `from` to `to`.
///
/// Returns the number of files copied.
pub fn relocate_tree(from: &Path, to: &Path, options: RelocateOptions) -> CoreResult<u64> {
    if resolve(to).starts_with(resolve(from)) {
        return Err(CoreError::invalid_operation(format!(
            "cannot relocate {} into {}",
            from.display(),
            to.display()
        )));
    }

    let guard = lock_offline(from)?;
    let copied = copy_dir_all(from, to, options.overwrite)?;
    drop(guard);

    if !options.keep_old_source {
        fs::remove_dir_all(from)?;
    }

    info!(from = %from.display(), to = %to.display(), files = copied, "relocated tree");
    Ok(copied)
}

/// Takes the directory lock of `root`, failing if a database holds it.
fn lock_offline(root: &Path) -> CoreResult<Option<File>> {
    let path = root.join(LOCK_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let file = OpenOptions::new().read(true).write(true).open(&path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(CoreError::DatabaseLocked {
            path: root.to_path_buf(),
        });
    }
    Ok(Some(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::lifecycle::Lifecycle;
    use crate::table::TableOptions;
    use filedb_codec::Format;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        sku: String,
        stock: u32,
    }

    fn item(sku: &str, stock: u32) -> Item {
        Item {
            sku: sku.into(),
            stock,
        }
    }

    /// Builds a stopped database with two tables and a few commits.
    fn populate(root: &Path) -> Database {
        let db = Database::new("warehouse", root, DatabaseConfig::new()).unwrap();
        db.register_table(TableOptions::keyed("items", |i: &Item| i.sku.clone()))
            .unwrap();
        db.register_table(
            TableOptions::keyed("archive", |i: &Item| i.sku.clone()).format(Format::Cbor),
        )
        .unwrap();
        db.startup().unwrap();

        db.transaction(|conn| conn.insert("items", &item("a", 1)))
            .unwrap();
        db.transaction(|conn| conn.insert("archive", &item("z", 0)))
            .unwrap();
        db.shutdown().unwrap();

        db.startup().unwrap();
        db.transaction(|conn| conn.insert("items", &item("b", 2)))
            .unwrap();
        db.shutdown().unwrap();
        db
    }

    #[test]
    fn lists_database_and_tables() {
        let dir = tempdir().unwrap();
        let _db = populate(dir.path());
        let inspector = DatabaseInspector::new(dir.path());

        assert_eq!(inspector.info().unwrap().identifier, "warehouse");
        let tables: Vec<_> = inspector
            .tables()
            .unwrap()
            .into_iter()
            .map(|t| (t.identifier, t.format))
            .collect();
        assert_eq!(
            tables,
            vec![
                ("archive".to_string(), Format::Cbor),
                ("items".to_string(), Format::Json)
            ]
        );
    }

    #[test]
    fn non_database_directory_is_reported() {
        let dir = tempdir().unwrap();
        let inspector = DatabaseInspector::new(dir.path());

        assert!(matches!(
            inspector.info(),
            Err(CoreError::InvalidInfoFile { .. })
        ));
        assert!(inspector.tables().unwrap().is_empty());
        assert!(matches!(
            inspector.table("items"),
            Err(CoreError::TableNotFound { .. })
        ));
    }

    #[test]
    fn records_decode_without_the_record_type() {
        let dir = tempdir().unwrap();
        let _db = populate(dir.path());
        let inspector = DatabaseInspector::new(dir.path());

        let items = inspector.records("items").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["sku"], "a");

        let archive = inspector.records("archive").unwrap();
        assert_eq!(archive[0]["stock"], 0);
    }

    #[test]
    fn verify_detects_corruption_and_restore_repairs_it() {
        let dir = tempdir().unwrap();
        let _db = populate(dir.path());
        let inspector = DatabaseInspector::new(dir.path());

        let report = inspector.verify_table("items").unwrap();
        assert_eq!(report.status, SourceStatus::Valid { items: 2 });
        assert!(report.backups >= 2);

        fs::write(report.directory.join("Data.json"), b"{ broken").unwrap();
        let report = inspector.verify_table("items").unwrap();
        assert!(matches!(report.status, SourceStatus::Corrupt { .. }));

        inspector.restore("items", BackupChoice::Latest).unwrap();
        assert!(inspector.verify_table("items").unwrap().status.is_valid());
    }

    #[test]
    fn missing_data_file_is_reported() {
        let dir = tempdir().unwrap();
        let _db = populate(dir.path());
        let inspector = DatabaseInspector::new(dir.path());

        fs::remove_file(dir.path().join("Tables/archive/Data.cbor")).unwrap();
        let reports = inspector.verify().unwrap();
        assert_eq!(reports[0].info.identifier, "archive");
        assert_eq!(reports[0].status, SourceStatus::Missing);
        assert!(reports[1].status.is_valid());
    }

    #[test]
    fn restore_out_of_range_fails() {
        let dir = tempdir().unwrap();
        let _db = populate(dir.path());
        let inspector = DatabaseInspector::new(dir.path());

        let count = inspector.backups("items").unwrap().len();
        assert!(matches!(
            inspector.restore("items", BackupChoice::Index(count)),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn restore_refuses_running_database() {
        let dir = tempdir().unwrap();
        let db = populate(dir.path());
        db.startup().unwrap();

        let inspector = DatabaseInspector::new(dir.path());
        assert!(matches!(
            inspector.restore("items", BackupChoice::Earliest),
            Err(CoreError::DatabaseLocked { .. })
        ));
    }

    #[test]
    fn relocate_tree_moves_files() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        let _db = populate(&from);

        let copied = relocate_tree(&from, &to, RelocateOptions::new()).unwrap();
        assert!(copied > 0);
        assert!(!from.exists());
        assert_eq!(
            DatabaseInspector::new(&to).records("items").unwrap().len(),
            2
        );

        assert!(matches!(
            relocate_tree(&to, &to.join("nested"), RelocateOptions::new()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
