//! Typed tables.
//!
//! A [`Table<T>`] is an ordered list of records of one type, persisted as a
//! whole through its [`TableSource`]. Records have no built-in key: a
//! comparator supplied at registration decides which cached record an
//! update or delete refers to.
//!
//! Every operation needs the table's outstanding [`TableLock`]. The cache
//! is loaded on first access after startup, mutated in place, and written
//! back on commit only if something changed.
//!
//! ```rust,ignore
//! let orders = db.register_table(TableOptions::keyed("orders", |o: &Order| o.id))?;
//! db.startup()?;
//!
//! let lock = orders.acquire()?;
//! orders.insert(&lock, &Order::new(1))?;
//! orders.commit(lock)?;
//! ```

use crate::config::DatabaseConfig;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{wait_until, Lifecycle, LifecycleState, StateCell};
use crate::lock::{LockSlot, Lockable, TableLock, LOCK_POLL_INTERVAL};
use crate::migration::{self, MigrationOptions};
use crate::source::{PersistenceBacked, TableSource};
use crate::types::{ElementType, Record};
use filedb_codec::Format;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Decides whether two records are the same record.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Registration options for a table.
pub struct TableOptions<T> {
    identifier: String,
    comparator: Comparator<T>,
    format: Format,
    lock_timeout: Option<Duration>,
}

impl<T: Record> TableOptions<T> {
    /// Creates options for a table whose record identity is decided by
    /// `comparator`.
    pub fn new<F>(identifier: impl Into<String>, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            comparator: Arc::new(comparator),
            format: Format::default(),
            lock_timeout: None,
        }
    }

    /// Creates options for a table whose records are identical when `key`
    /// returns equal values.
    pub fn keyed<K, F>(identifier: impl Into<String>, key: F) -> Self
    where
        K: PartialEq,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::new(identifier, move |a: &T, b: &T| key(a) == key(b))
    }

    /// Sets the format of the data file.
    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Sets the lock acquisition timeout, overriding the database default.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Returns the table identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl<T> fmt::Debug for TableOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableOptions")
            .field("identifier", &self.identifier)
            .field("format", &self.format)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

/// Point-in-time description of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    /// Table identifier.
    pub identifier: String,
    /// Type name of the records.
    pub element_type: &'static str,
    /// Format of the data file.
    pub format: Format,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Whether a lock is outstanding.
    pub locked: bool,
    /// Whether a waiter timed out since the last release.
    pub deadlocked: bool,
    /// Directory of the table's files.
    pub directory: PathBuf,
}

/// A table as seen by the database: lifecycle, locking and persistence
/// without the element type.
pub trait DynTable: Lifecycle + Lockable + PersistenceBacked {
    /// Returns the element type.
    fn element_type(&self) -> ElementType;

    /// Returns a status snapshot.
    fn status(&self) -> TableStatus;

    /// Returns `self` for downcasting to `Table<T>`.
    fn as_any(&self) -> &dyn Any;

    /// Converts `self` for downcasting to `Arc<Table<T>>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[derive(Debug, Clone, Copy)]
struct TableSettings {
    shutdown_timeout: Duration,
    migration: MigrationOptions,
}

struct TableData<T> {
    source: Option<TableSource<T>>,
    records: Option<Vec<T>>,
    dirty: bool,
}

impl<T> TableData<T> {
    fn discard(&mut self) {
        self.records = None;
        self.dirty = false;
    }
}

/// A typed, lockable, persisted list of records.
pub struct Table<T> {
    identifier: String,
    format: Format,
    lock_timeout: Duration,
    comparator: Comparator<T>,
    settings: TableSettings,
    directory: RwLock<PathBuf>,
    lifecycle: StateCell,
    slot: LockSlot,
    data: Mutex<TableData<T>>,
}

impl<T: Record> Table<T> {
    /// Creates a stopped table living in `directory`.
    pub(crate) fn new(options: TableOptions<T>, directory: PathBuf, config: &DatabaseConfig) -> Self {
        Self {
            identifier: options.identifier,
            format: options.format,
            lock_timeout: options.lock_timeout.unwrap_or(config.default_lock_timeout),
            comparator: options.comparator,
            settings: TableSettings {
                shutdown_timeout: config.shutdown_timeout,
                migration: MigrationOptions {
                    backup_retention: config.backup_retention,
                    keep_old_source: config.keep_old_source,
                },
            },
            directory: RwLock::new(directory),
            lifecycle: StateCell::new(),
            slot: LockSlot::new(),
            data: Mutex::new(TableData {
                source: None,
                records: None,
                dirty: false,
            }),
        }
    }

    /// Returns every record.
    pub fn get_all(&self, lock: &TableLock) -> CoreResult<Vec<T>> {
        self.with_records(lock, |records, _, source| source.clone_records(records))
    }

    /// Returns every record matching `predicate`, in table order.
    pub fn query<P>(&self, lock: &TableLock, predicate: P) -> CoreResult<Vec<T>>
    where
        P: Fn(&T) -> bool,
    {
        self.with_records(lock, |records, _, source| {
            records
                .iter()
                .filter(|r| predicate(r))
                .map(|r| source.clone_record(r))
                .collect()
        })
    }

    /// Returns the first record matching `predicate`.
    pub fn get_one<P>(&self, lock: &TableLock, predicate: P) -> CoreResult<T>
    where
        P: Fn(&T) -> bool,
    {
        self.with_records(lock, |records, _, source| match records.iter().find(|r| predicate(r)) {
            Some(record) => source.clone_record(record),
            None => Err(CoreError::no_matching_records(&self.identifier)),
        })
    }

    /// Returns the number of records.
    pub fn count(&self, lock: &TableLock) -> CoreResult<usize> {
        self.with_records(lock, |records, _, _| Ok(records.len()))
    }

    /// Appends a copy of `record`.
    pub fn insert(&self, lock: &TableLock, record: &T) -> CoreResult<()> {
        self.insert_many(lock, std::slice::from_ref(record))
    }

    /// Appends copies of `records`, in order.
    pub fn insert_many(&self, lock: &TableLock, records: &[T]) -> CoreResult<()> {
        self.with_records(lock, |cached, dirty, source| {
            for record in records {
                cached.push(source.clone_record(record)?);
                *dirty = true;
            }
            Ok(())
        })
    }

    /// Replaces the cached record identical to `record`.
    ///
    /// Fails with [`CoreError::RecordNotFound`] if there is none.
    pub fn update(&self, lock: &TableLock, record: &T) -> CoreResult<()> {
        self.update_many(lock, std::slice::from_ref(record))
    }

    /// Replaces the cached record identical to each of `records`.
    ///
    /// Items are applied in order; a missing one stops the batch and leaves
    /// the earlier replacements in the cache.
    pub fn update_many(&self, lock: &TableLock, records: &[T]) -> CoreResult<()> {
        self.with_records(lock, |cached, dirty, source| {
            for record in records {
                let position = self
                    .position_of(cached, record)
                    .ok_or_else(|| CoreError::record_not_found(&self.identifier))?;
                cached[position] = source.clone_record(record)?;
                *dirty = true;
            }
            Ok(())
        })
    }

    /// Applies `mutator` to every record matching `predicate`.
    ///
    /// Returns the number of records changed.
    pub fn update_by<P, M>(&self, lock: &TableLock, predicate: P, mut mutator: M) -> CoreResult<usize>
    where
        P: Fn(&T) -> bool,
        M: FnMut(&mut T),
    {
        self.with_records(lock, |cached, dirty, _| {
            let mut matched = 0;
            for record in cached.iter_mut().filter(|r| predicate(r)) {
                mutator(record);
                matched += 1;
            }
            if matched > 0 {
                *dirty = true;
            }
            Ok(matched)
        })
    }

    /// Removes the cached record identical to `record`.
    ///
    /// Fails with [`CoreError::RecordNotFound`] if there is none.
    pub fn delete(&self, lock: &TableLock, record: &T) -> CoreResult<()> {
        self.delete_many(lock, std::slice::from_ref(record))
    }

    /// Removes the cached record identical to each of `records`.
    pub fn delete_many(&self, lock: &TableLock, records: &[T]) -> CoreResult<()> {
        self.with_records(lock, |cached, dirty, _| {
            for record in records {
                let position = self
                    .position_of(cached, record)
                    .ok_or_else(|| CoreError::record_not_found(&self.identifier))?;
                cached.remove(position);
                *dirty = true;
            }
            Ok(())
        })
    }

    /// Removes every record matching `predicate`. Returns how many were removed.
    pub fn delete_by<P>(&self, lock: &TableLock, predicate: P) -> CoreResult<usize>
    where
        P: Fn(&T) -> bool,
    {
        self.with_records(lock, |cached, dirty, _| {
            let before = cached.len();
            cached.retain(|r| !predicate(r));
            let removed = before - cached.len();
            if removed > 0 {
                *dirty = true;
            }
            Ok(removed)
        })
    }

    /// Returns the retained backups of the data file, most recent first.
    pub fn backups(&self) -> CoreResult<Vec<filedb_storage::Backup>> {
        let data = self.data.lock();
        match &data.source {
            Some(source) => source.backups(),
            None => TableSource::<T>::new(
                &self.identifier,
                &self.directory(),
                self.format,
                self.settings.migration.backup_retention,
            )
            .backups(),
        }
    }

    fn position_of(&self, cached: &[T], record: &T) -> Option<usize> {
        cached.iter().position(|r| (self.comparator)(r, record))
    }

    /// Runs `f` on the loaded cache after checking `lock`.
    fn with_records<R, F>(&self, lock: &TableLock, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Vec<T>, &mut bool, &TableSource<T>) -> CoreResult<R>,
    {
        let mut data = self.data.lock();
        self.slot.validate(&self.identifier, lock)?;

        let TableData {
            source,
            records,
            dirty,
        } = &mut *data;
        let source = source.as_ref().ok_or_else(|| {
            CoreError::invalid_state(
                &self.identifier,
                LifecycleState::Running,
                self.lifecycle.get(),
            )
        })?;

        if records.is_none() {
            *records = Some(source.load()?);
            debug!(table = %self.identifier, "loaded cache");
        }
        let records = records.get_or_insert_with(Vec::new);

        f(records, dirty, source)
    }

    fn start(&self) -> CoreResult<()> {
        let directory = self.directory();
        let source = TableSource::<T>::new(
            &self.identifier,
            &directory,
            self.format,
            self.settings.migration.backup_retention,
        );

        source.initialize()?;
        let outcome = migration::reconcile(&source, self.settings.migration)?;
        source.create_backup()?;

        let mut data = self.data.lock();
        data.source = Some(source);
        data.discard();

        info!(table = %self.identifier, format = %self.format, ?outcome, "table started");
        Ok(())
    }

    fn stop(&self) -> CoreResult<()> {
        // Taken first so an in-flight commit or operation completes under its lock.
        let mut data = self.data.lock();
        if self.slot.force_release() {
            warn!(table = %self.identifier, "table shut down while locked, lock revoked");
        }
        data.discard();

        if let Some(source) = data.source.take() {
            let free = wait_until(self.settings.shutdown_timeout, LOCK_POLL_INTERVAL, || {
                source.is_free()
            })?;
            if !free {
                warn!(table = %self.identifier, "data file still busy at shutdown");
            }
            source.create_backup()?;
        }

        info!(table = %self.identifier, "table stopped");
        Ok(())
    }
}

impl<T: Record> Lifecycle for Table<T> {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    fn startup(&self) -> CoreResult<()> {
        self.lifecycle.run_startup(&self.identifier, || self.start())
    }

    fn shutdown(&self) -> CoreResult<()> {
        self.lifecycle.run_shutdown(&self.identifier, || self.stop())
    }
}

impl<T: Record> Lockable for Table<T> {
    fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn try_acquire(&self, timeout: Duration) -> CoreResult<TableLock> {
        self.slot.acquire(&self.identifier, timeout, &self.lifecycle)
    }

    fn commit(&self, lock: TableLock) -> CoreResult<()> {
        let mut data = self.data.lock();
        self.slot.validate(&self.identifier, &lock)?;

        let result = match (&data.source, &data.records) {
            (Some(source), Some(records)) if data.dirty => source.persist(records),
            _ => Ok(()),
        };
        if let Err(e) = &result {
            warn!(table = %self.identifier, error = %e, "commit failed, cache discarded");
            data.records = None;
        }
        data.dirty = false;
        self.slot.release(&self.identifier, &lock)?;
        drop(data);
        result
    }

    fn abort(&self, lock: TableLock) -> CoreResult<()> {
        let mut data = self.data.lock();
        self.slot.validate(&self.identifier, &lock)?;

        if data.dirty {
            data.discard();
            debug!(table = %self.identifier, "discarded pending changes");
        }
        self.slot.release(&self.identifier, &lock)?;
        drop(data);
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.slot.is_locked()
    }

    fn is_deadlocked(&self) -> bool {
        self.slot.is_deadlocked()
    }
}

impl<T: Record> PersistenceBacked for Table<T> {
    fn format(&self) -> Format {
        self.format
    }

    fn directory(&self) -> PathBuf {
        self.directory.read().clone()
    }

    fn set_directory(&self, directory: &Path) -> CoreResult<()> {
        self.lifecycle
            .ensure(&self.identifier, LifecycleState::Shutdown)?;
        *self.directory.write() = directory.to_path_buf();
        Ok(())
    }
}

impl<T: Record> DynTable for Table<T> {
    fn element_type(&self) -> ElementType {
        ElementType::of::<T>()
    }

    fn status(&self) -> TableStatus {
        TableStatus {
            identifier: self.identifier.clone(),
            element_type: ElementType::of::<T>().name(),
            format: self.format,
            state: self.lifecycle.get(),
            locked: self.slot.is_locked(),
            deadlocked: self.slot.is_deadlocked(),
            directory: self.directory(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("identifier", &self.identifier)
            .field("format", &self.format)
            .field("state", &self.lifecycle.get())
            .finish_non_exhaustive()
    }
}
