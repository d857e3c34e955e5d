//! Format migration of table sources.
//!
//! A table's `Table.info` records the format its data was last written in.
//! When a table starts with a different format, its records are moved from
//! the old data file into the new one before the table goes live:
//!
//! 1. Initialize the old source (validating or restoring it)
//! 2. Load its records
//! 3. Persist them through the new source and back the result up
//! 4. Clear the old file and its backups, unless told to keep them
//! 5. Rewrite `Table.info` with the new format
//!
//! Old data is only cleared after the new file has been written, so a crash
//! at any point leaves at least one complete copy on disk.

use crate::error::{CoreError, CoreResult};
use crate::info::TableInfo;
use crate::source::TableSource;
use crate::types::Record;
use filedb_codec::Format;
use std::any;
use tracing::{info, warn};

/// What the startup reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The directory was new; `Table.info` was written.
    Created,
    /// `Table.info` matched the table.
    Unchanged,
    /// Records were moved from the recorded format.
    Migrated {
        /// The format the data was stored in before.
        from: Format,
        /// Number of records moved.
        records: usize,
    },
}

/// Migration behaviour taken from the database configuration.
#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    /// Retention of the old source's backup set while it is read.
    pub backup_retention: usize,
    /// Keep the old data file and its backups after migrating.
    pub keep_old_source: bool,
}

/// Brings the table directory of `current` in line with its format.
///
/// `current` must already be initialized.
pub fn reconcile<T: Record>(
    current: &TableSource<T>,
    options: MigrationOptions,
) -> CoreResult<Reconciliation> {
    let dir = current.directory();
    let element_type = any::type_name::<T>();

    let Some(mut recorded) = TableInfo::read(dir)? else {
        TableInfo::new(current.table(), element_type, current.format()).write(dir)?;
        return Ok(Reconciliation::Created);
    };

    if recorded.identifier != current.table() {
        return Err(CoreError::DirectoryAlreadyUsed {
            path: dir.to_path_buf(),
            owner: recorded.identifier,
        });
    }

    if recorded.element_type != element_type {
        warn!(
            table = current.table(),
            recorded = %recorded.element_type,
            registered = element_type,
            "element type name changed"
        );
    }

    if recorded.format == current.format() {
        if recorded.element_type != element_type {
            recorded.element_type = element_type.to_string();
            recorded.write(dir)?;
        }
        return Ok(Reconciliation::Unchanged);
    }

    let from = recorded.format;
    let previous = TableSource::<T>::new(current.table(), dir, from, options.backup_retention);
    let records = migrate_source(&previous, current, options.keep_old_source)?;

    // Creator and creation time survive the migration.
    recorded.format = current.format();
    recorded.element_type = element_type.to_string();
    recorded.write(dir)?;

    Ok(Reconciliation::Migrated { from, records })
}

/// Moves every record of `from` into `to`. Returns the number moved.
///
/// A missing `from` file moves nothing and leaves `to` untouched.
pub fn migrate_source<T: Record>(
    from: &TableSource<T>,
    to: &TableSource<T>,
    keep_old_source: bool,
) -> CoreResult<usize> {
    if !from.exists() {
        warn!(
            table = from.table(),
            path = %from.path().display(),
            "recorded source is missing, nothing to migrate"
        );
        return Ok(0);
    }

    from.initialize()?;
    let records = from.load()?;
    to.persist(&records)?;
    to.create_backup()?;

    if !keep_old_source {
        from.clear()?;
    }

    info!(
        table = to.table(),
        from = %from.format(),
        to = %to.format(),
        records = records.len(),
        "migrated source"
    );
    Ok(records.len())
}
