//! Multi-table units of work.
//!
//! A [`Connection`] locks each table the first time it touches it and keeps
//! the lock until [`Connection::commit`] or [`Connection::abort`]. Changes
//! stay in the tables' caches until commit, so other connections never see
//! them half-done.
//!
//! Commit flushes each touched table independently. A crash between two
//! tables' flushes leaves them at different points in time.
//!
//! # Example
//!
//! ```rust,ignore
//! let conn = db.connect()?;
//! conn.insert("orders", &order)?;
//! conn.delete_by("drafts", |d: &Draft| d.order_id == order.id)?;
//! conn.commit()?;
//! ```

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::Lifecycle;
use crate::lock::TableLock;
use crate::table::{DynTable, Table};
use crate::types::{ElementType, Record};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct Entry {
    table: Arc<dyn DynTable>,
    lock: TableLock,
}

/// A scoped handle grouping operations on several tables.
///
/// Dropping a connection that was neither committed nor aborted aborts it.
///
/// Operations on one connection are serialized. Closures passed to the
/// predicate and mutator operations run while the connection is held and
/// must not call back into it.
pub struct Connection<'db> {
    database: &'db Database,
    entries: Mutex<Vec<Entry>>,
    finished: AtomicBool,
}

impl<'db> Connection<'db> {
    pub(crate) fn new(database: &'db Database) -> Self {
        Self {
            database,
            entries: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    /// Returns whether the connection was committed or aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Returns the identifiers of the tables locked so far.
    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|e| e.lock.table().to_string())
            .collect()
    }

    /// Returns every record of `table`.
    pub fn get_all<T: Record>(&self, table: &str) -> CoreResult<Vec<T>> {
        self.with_table(table, |t: &Table<T>, lock| t.get_all(lock))
    }

    /// Returns the records of `table` matching `predicate`.
    pub fn query<T, P>(&self, table: &str, predicate: P) -> CoreResult<Vec<T>>
    where
        T: Record,
        P: Fn(&T) -> bool,
    {
        self.with_table(table, |t: &Table<T>, lock| t.query(lock, predicate))
    }

    /// Returns the first record of `table` matching `predicate`.
    pub fn get_one<T, P>(&self, table: &str, predicate: P) -> CoreResult<T>
    where
        T: Record,
        P: Fn(&T) -> bool,
    {
        self.with_table(table, |t: &Table<T>, lock| t.get_one(lock, predicate))
    }

    /// Returns the number of records in `table`.
    pub fn count<T: Record>(&self, table: &str) -> CoreResult<usize> {
        self.with_table(table, |t: &Table<T>, lock| t.count(lock))
    }

    /// Inserts a copy of `record` into `table`.
    pub fn insert<T: Record>(&self, table: &str, record: &T) -> CoreResult<()> {
        self.with_table(table, |t: &Table<T>, lock| t.insert(lock, record))
    }

    /// Inserts copies of `records` into `table`.
    pub fn insert_many<T: Record>(&self, table: &str, records: &[T]) -> CoreResult<()> {
        self.with_table(table, |t: &Table<T>, lock| t.insert_many(lock, records))
    }

    /// Replaces the record of `table` identical to `record`.
    pub fn update<T: Record>(&self, table: &str, record: &T) -> CoreResult<()> {
        self.with_table(table, |t: &Table<T>, lock| t.update(lock, record))
    }

    /// Replaces the records of `table` identical to `records`.
    pub fn update_many<T: Record>(&self, table: &str, records: &[T]) -> CoreResult<()> {
        self.with_table(table, |t: &Table<T>, lock| t.update_many(lock, records))
    }

    /// Applies `mutator` to every record of `table` matching `predicate`.
    pub fn update_by<T, P, M>(&self, table: &str, predicate: P, mutator: M) -> CoreResult<usize>
    where
        T: Record,
        P: Fn(&T) -> bool,
        M: FnMut(&mut T),
    {
        self.with_table(table, |t: &Table<T>, lock| {
            t.update_by(lock, predicate, mutator)
        })
    }

    /// Removes the record of `table` identical to `record`.
    pub fn delete<T: Record>(&self, table: &str, record: &T) -> CoreResult<()> {
        self.with_table(table, |t: &Table<T>, lock| t.delete(lock, record))
    }

    /// Removes the records of `table` identical to `records`.
    pub fn delete_many<T: Record>(&self, table: &str, records: &[T]) -> CoreResult<()> {
        self.with_table(table, |t: &Table<T>, lock| t.delete_many(lock, records))
    }

    /// Removes every record of `table` matching `predicate`.
    pub fn delete_by<T, P>(&self, table: &str, predicate: P) -> CoreResult<usize>
    where
        T: Record,
        P: Fn(&T) -> bool,
    {
        self.with_table(table, |t: &Table<T>, lock| t.delete_by(lock, predicate))
    }

    /// Persists the changes to every touched table and releases them.
    ///
    /// If a table fails to commit, the tables not yet committed are
    /// aborted and the error is returned. Committing a finished connection
    /// does nothing.
    pub fn commit(&self) -> CoreResult<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let entries = self.take_entries();
        let mut remaining = entries.into_iter();
        while let Some(entry) = remaining.next() {
            let table = entry.table.identifier().to_string();
            if let Err(e) = entry.table.commit(entry.lock) {
                warn!(table = %table, error = %e, "commit failed, aborting remaining tables");
                for rest in remaining {
                    Self::abort_entry(rest);
                }
                return Err(e);
            }
        }

        debug!(database = self.database.identifier(), "connection committed");
        Ok(())
    }

    /// Discards the changes to every touched table and releases them.
    ///
    /// Per-table failures are logged and otherwise ignored. Aborting a
    /// finished connection does nothing.
    pub fn abort(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        for entry in self.take_entries() {
            Self::abort_entry(entry);
        }
        debug!(database = self.database.identifier(), "connection aborted");
    }

    fn abort_entry(entry: Entry) {
        let table = entry.table.identifier().to_string();
        if let Err(e) = entry.table.abort(entry.lock) {
            warn!(table = %table, error = %e, "abort failed");
        }
    }

    fn take_entries(&self) -> Vec<Entry> {
        std::mem::take(&mut *self.entries.lock())
    }

    fn with_table<T, R, F>(&self, table: &str, f: F) -> CoreResult<R>
    where
        T: Record,
        F: FnOnce(&Table<T>, &TableLock) -> CoreResult<R>,
    {
        let mut entries = self.entries.lock();
        if self.is_finished() {
            return Err(CoreError::ConnectionClosed);
        }

        let position = match entries.iter().position(|e| e.lock.table() == table) {
            Some(position) => position,
            None => {
                let entry = self.open_entry::<T>(table)?;
                entries.push(entry);
                entries.len() - 1
            }
        };

        let entry = &entries[position];
        let typed = entry
            .table
            .as_any()
            .downcast_ref::<Table<T>>()
            .ok_or_else(|| CoreError::TableTypeMismatch {
                table: table.to_string(),
                expected: entry.table.element_type().name(),
                requested: ElementType::of::<T>().name(),
            })?;
        f(typed, &entry.lock)
    }

    fn open_entry<T: Record>(&self, table: &str) -> CoreResult<Entry> {
        let resolved = self.database.dyn_table(table)?;
        let expected = resolved.element_type();
        if !expected.is::<T>() {
            return Err(CoreError::TableTypeMismatch {
                table: table.to_string(),
                expected: expected.name(),
                requested: ElementType::of::<T>().name(),
            });
        }

        let lock = resolved.acquire()?;
        debug!(table, "connection locked table");
        Ok(Entry {
            table: resolved,
            lock,
        })
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}

impl fmt::Debug for Connection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("database", &self.database.identifier())
            .field("tables", &self.tables())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::lifecycle::LifecycleState;
    use crate::table::TableOptions;
    use serde::{Deserialize, Serialize};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: u32,
        balance: i64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Posting {
        account: u32,
        amount: i64,
    }

    fn account(id: u32, balance: i64) -> Account {
        Account { id, balance }
    }

    fn open(dir: &TempDir) -> Database {
        let config = DatabaseConfig::new().default_lock_timeout(Duration::from_millis(300));
        let db = Database::new("ledger", dir.path(), config).unwrap();
        db.register_table(TableOptions::keyed("accounts", |a: &Account| a.id))
            .unwrap();
        db.register_table(TableOptions::new("entries", |a: &Posting, b: &Posting| a == b))
            .unwrap();
        db.startup().unwrap();
        db
    }

    #[test]
    fn tables_are_locked_on_first_use() {
        let dir = tempdir().unwrap();
        let db = open(&dir);
        let conn = db.connect().unwrap();
        assert!(conn.tables().is_empty());

        conn.count::<Account>("accounts").unwrap();
        conn.count::<Account>("accounts").unwrap();
        assert_eq!(conn.tables(), vec!["accounts".to_string()]);
        assert!(db.dyn_table("accounts").unwrap().is_locked());
        assert!(!db.dyn_table("entries").unwrap().is_locked());

        conn.abort();
        assert!(!db.dyn_table("accounts").unwrap().is_locked());
    }

    #[test]
    fn commit_persists_every_touched_table() {
        let dir = tempdir().unwrap();
        let db = open(&dir);

        let conn = db.connect().unwrap();
        conn.insert("accounts", &account(1, 100)).unwrap();
        conn.insert(
            "entries",
            &Posting {
                account: 1,
                amount: 100,
            },
        )
        .unwrap();
        conn.commit().unwrap();
        assert!(conn.is_finished());
        drop(conn);

        db.shutdown().unwrap();
        db.startup().unwrap();

        let conn = db.connect().unwrap();
        assert_eq!(conn.get_all::<Account>("accounts").unwrap(), vec![account(1, 100)]);
        assert_eq!(conn.count::<Posting>("entries").unwrap(), 1);
    }

    #[test]
    fn abort_discards_changes() {
        let dir = tempdir().unwrap();
        let db = open(&dir);

        let conn = db.connect().unwrap();
        conn.insert("accounts", &account(1, 100)).unwrap();
        conn.abort();

        let conn = db.connect().unwrap();
        assert_eq!(conn.count::<Account>("accounts").unwrap(), 0);
    }

    #[test]
    fn drop_without_commit_aborts() {
        let dir = tempdir().unwrap();
        let db = open(&dir);

        {
            let conn = db.connect().unwrap();
            conn.insert("accounts", &account(7, 1)).unwrap();
        }

        let conn = db.connect().unwrap();
        assert!(conn.get_all::<Account>("accounts").unwrap().is_empty());
    }

    #[test]
    fn finished_connection_is_closed() {
        let dir = tempdir().unwrap();
        let db = open(&dir);

        let conn = db.connect().unwrap();
        conn.commit().unwrap();
        assert!(matches!(
            conn.count::<Account>("accounts"),
            Err(CoreError::ConnectionClosed)
        ));
        conn.commit().unwrap();
        conn.abort();
    }

    #[test]
    fn wrong_type_and_unknown_table_fail_without_locking() {
        let dir = tempdir().unwrap();
        let db = open(&dir);
        let conn = db.connect().unwrap();

        assert!(matches!(
            conn.count::<Posting>("accounts"),
            Err(CoreError::TableTypeMismatch { .. })
        ));
        assert!(matches!(
            conn.count::<Account>("missing"),
            Err(CoreError::TableNotFound { .. })
        ));
        assert!(conn.tables().is_empty());
        assert!(!db.dyn_table("accounts").unwrap().is_locked());
    }

    #[test]
    fn update_and_delete_through_connection() {
        let dir = tempdir().unwrap();
        let db = open(&dir);
        let conn = db.connect().unwrap();

        conn.insert_many("accounts", &[account(1, 10), account(2, 20), account(3, 30)])
            .unwrap();
        conn.update("accounts", &account(2, 25)).unwrap();
        let touched = conn
            .update_by("accounts", |a: &Account| a.balance >= 25, |a| a.balance += 1)
            .unwrap();
        assert_eq!(touched, 2);
        conn.delete("accounts", &account(1, 0)).unwrap();

        let rich = conn
            .query("accounts", |a: &Account| a.balance > 20)
            .unwrap();
        assert_eq!(rich, vec![account(2, 26), account(3, 31)]);
        assert!(matches!(
            conn.update("accounts", &account(9, 0)),
            Err(CoreError::RecordNotFound { .. })
        ));
        assert_eq!(conn.delete_by("accounts", |_: &Account| true).unwrap(), 2);
    }

    #[test]
    fn second_connection_waits_for_commit() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::new().default_lock_timeout(Duration::from_secs(5));
        let db = Database::new("ledger", dir.path(), config).unwrap();
        db.register_table(TableOptions::keyed("accounts", |a: &Account| a.id))
            .unwrap();
        db.startup().unwrap();

        let first = db.connect().unwrap();
        first
            .insert_many("accounts", &[account(1, 1), account(2, 2), account(3, 3)])
            .unwrap();

        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            scope.spawn(|| {
                let second = db.connect().unwrap();
                let count = second.count::<Account>("accounts").unwrap();
                tx.send(count).unwrap();
                second.commit().unwrap();
            });

            thread::sleep(Duration::from_millis(200));
            assert!(rx.try_recv().is_err());
            first.commit().unwrap();
        });

        assert_eq!(rx.recv().unwrap(), 3);
    }

    #[test]
    fn lock_timeout_reports_deadlock() {
        let dir = tempdir().unwrap();
        let db = open(&dir);

        let first = db.connect().unwrap();
        first.count::<Account>("accounts").unwrap();

        let second = db.connect().unwrap();
        assert!(matches!(
            second.count::<Account>("accounts"),
            Err(CoreError::DeadLocked { .. })
        ));
        assert!(db.dyn_table("accounts").unwrap().is_deadlocked());

        first.abort();
        assert!(!db.dyn_table("accounts").unwrap().is_deadlocked());
        second.count::<Account>("accounts").unwrap();
    }

    #[test]
    fn shutdown_invalidates_open_connection() {
        let dir = tempdir().unwrap();
        let db = open(&dir);

        let conn = db.connect().unwrap();
        conn.insert("accounts", &account(1, 1)).unwrap();
        db.shutdown().unwrap();
        assert_eq!(db.state(), LifecycleState::Shutdown);

        assert!(conn.commit().is_err());
    }
}
