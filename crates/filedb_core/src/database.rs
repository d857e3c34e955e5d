//! Database facade.

use crate::config::DatabaseConfig;
use crate::connection::Connection;
use crate::error::{CoreError, CoreResult};
use crate::info::DatabaseInfo;
use crate::lifecycle::{Lifecycle, LifecycleState, StateCell};
use crate::page::{DynPage, Page, PageOptions};
use crate::source::PersistenceBacked;
use crate::table::{DynTable, Table, TableOptions, TableStatus};
use crate::types::{validate_identifier, ElementType, Record};
use filedb_storage::fs::copy_dir_all;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Directory holding one sub-directory per table.
pub const TABLES_DIR: &str = "Tables";

/// Directory holding one sub-directory per page.
pub const PAGES_DIR: &str = "Pages";

/// Advisory lock held while a database runs.
pub(crate) const LOCK_FILE: &str = "Database.lock";

/// Options for [`Database::relocate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocateOptions {
    /// Replace files that already exist at the target.
    pub overwrite: bool,
    /// Leave the old tree in place after copying.
    pub keep_old_source: bool,
}

impl RelocateOptions {
    /// Creates options that neither overwrite nor keep the old tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether existing target files are replaced.
    #[must_use]
    pub const fn overwrite(mut self, value: bool) -> Self {
        self.overwrite = value;
        self
    }

    /// Sets whether the old tree is kept.
    #[must_use]
    pub const fn keep_old_source(mut self, value: bool) -> Self {
        self.keep_old_source = value;
        self
    }
}

/// A named set of tables and pages under one root directory.
///
/// `Database` is the entry point for working with FileDB. It provides:
/// - Registration of tables and pages
/// - Startup and shutdown of everything it owns
/// - Connections for locked, all-or-nothing work on tables
/// - Relocation of its directory tree
///
/// # Layout
///
/// ```text
/// <root>/
/// ├─ Database.info     # identifier|creator host|created
/// ├─ Database.lock     # held while running
/// ├─ Tables/<id>/...
/// └─ Pages/<id>/Content.<ext>
/// ```
///
/// # Example
///
/// ```rust
/// use filedb_core::{Database, DatabaseConfig, Lifecycle, TableOptions};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Order {
///     id: u32,
///     amount: u64,
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// let db = Database::new("shop", dir.path(), DatabaseConfig::default()).unwrap();
/// db.register_table(TableOptions::keyed("orders", |o: &Order| o.id)).unwrap();
/// db.startup().unwrap();
///
/// db.transaction(|conn| conn.insert("orders", &Order { id: 1, amount: 250 }))
///     .unwrap();
///
/// let conn = db.connect().unwrap();
/// assert_eq!(conn.count::<Order>("orders").unwrap(), 1);
/// conn.abort();
/// # drop(conn);
///
/// db.shutdown().unwrap();
/// ```
pub struct Database {
    identifier: String,
    config: DatabaseConfig,
    root: RwLock<PathBuf>,
    lifecycle: StateCell,
    tables: RwLock<Vec<Arc<dyn DynTable>>>,
    pages: RwLock<Vec<Arc<dyn DynPage>>>,
    dir_lock: Mutex<Option<File>>,
}

impl Database {
    /// Creates a stopped database rooted at `root`. Nothing is touched on
    /// disk until [`Lifecycle::startup`].
    pub fn new(
        identifier: impl Into<String>,
        root: impl Into<PathBuf>,
        config: DatabaseConfig,
    ) -> CoreResult<Self> {
        let identifier = identifier.into();
        validate_identifier(&identifier)?;
        Ok(Self {
            identifier,
            config,
            root: RwLock::new(root.into()),
            lifecycle: StateCell::new(),
            tables: RwLock::new(Vec::new()),
            pages: RwLock::new(Vec::new()),
            dir_lock: Mutex::new(None),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.root.read().clone()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Registers a table. The database must be shut down.
    pub fn register_table<T: Record>(&self, options: TableOptions<T>) -> CoreResult<Arc<Table<T>>> {
        validate_identifier(options.identifier())?;
        let mut tables = self.tables.write();
        self.lifecycle
            .ensure(&self.identifier, LifecycleState::Shutdown)?;

        if tables.iter().any(|t| t.identifier() == options.identifier()) {
            return Err(CoreError::TableAlreadyExists {
                table: options.identifier().to_string(),
            });
        }

        let directory = self.root().join(TABLES_DIR).join(options.identifier());
        let table = Arc::new(Table::new(options, directory, &self.config));
        tables.push(Arc::clone(&table) as Arc<dyn DynTable>);
        Ok(table)
    }

    /// Registers a page. The database must be shut down.
    pub fn register_page<T: Record>(&self, options: PageOptions<T>) -> CoreResult<Arc<Page<T>>> {
        validate_identifier(options.identifier())?;
        let mut pages = self.pages.write();
        self.lifecycle
            .ensure(&self.identifier, LifecycleState::Shutdown)?;

        if pages.iter().any(|p| p.identifier() == options.identifier()) {
            return Err(CoreError::PageAlreadyExists {
                page: options.identifier().to_string(),
            });
        }

        let directory = self.root().join(PAGES_DIR).join(options.identifier());
        let page = Arc::new(Page::new(options, directory, &self.config));
        pages.push(Arc::clone(&page) as Arc<dyn DynPage>);
        Ok(page)
    }

    /// Returns the table `identifier`, which must store `T`.
    pub fn table<T: Record>(&self, identifier: &str) -> CoreResult<Arc<Table<T>>> {
        let table = self.dyn_table(identifier)?;
        let expected = table.element_type();
        table
            .into_any()
            .downcast::<Table<T>>()
            .map_err(|_| CoreError::TableTypeMismatch {
                table: identifier.to_string(),
                expected: expected.name(),
                requested: ElementType::of::<T>().name(),
            })
    }

    /// Returns the page `identifier`, which must store `T`.
    pub fn page<T: Record>(&self, identifier: &str) -> CoreResult<Arc<Page<T>>> {
        let page = self
            .pages
            .read()
            .iter()
            .find(|p| p.identifier() == identifier)
            .cloned()
            .ok_or_else(|| CoreError::page_not_found(identifier))?;
        page.into_any()
            .downcast::<Page<T>>()
            .map_err(|_| CoreError::page_not_found(identifier))
    }

    pub(crate) fn dyn_table(&self, identifier: &str) -> CoreResult<Arc<dyn DynTable>> {
        self.tables
            .read()
            .iter()
            .find(|t| t.identifier() == identifier)
            .cloned()
            .ok_or_else(|| CoreError::table_not_found(identifier))
    }

    /// Returns a status snapshot of every table, in registration order.
    #[must_use]
    pub fn tables(&self) -> Vec<TableStatus> {
        self.tables.read().iter().map(|t| t.status()).collect()
    }

    /// Returns the identifiers of every page, in registration order.
    #[must_use]
    pub fn page_ids(&self) -> Vec<String> {
        self.pages
            .read()
            .iter()
            .map(|p| p.identifier().to_string())
            .collect()
    }

    /// Opens a connection. The database must be running.
    pub fn connect(&self) -> CoreResult<Connection<'_>> {
        self.lifecycle
            .ensure(&self.identifier, LifecycleState::Running)?;
        Ok(Connection::new(self))
    }

    /// Executes a function within a connection.
    ///
    /// If the function returns `Ok`, the connection is committed.
    /// If it returns `Err`, the connection is aborted.
    pub fn transaction<F, R>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&Connection<'_>) -> CoreResult<R>,
    {
        let conn = self.connect()?;
        match f(&conn) {
            Ok(value) => {
                conn.commit()?;
                Ok(value)
            }
            Err(e) => {
                conn.abort();
                Err(e)
            }
        }
    }

    /// Reads the page `identifier`.
    pub fn read_page<T: Record>(&self, identifier: &str) -> CoreResult<T> {
        self.page::<T>(identifier)?.read()
    }

    /// Writes the page `identifier`.
    pub fn write_page<T: Record>(&self, identifier: &str, value: &T) -> CoreResult<()> {
        self.page::<T>(identifier)?.write(value)
    }

    /// Moves the whole directory tree to `new_root`.
    ///
    /// The database and everything it owns must be shut down. `new_root`
    /// must not be the current root or lie inside it. Startup is refused
    /// while the relocation runs.
    pub fn relocate(&self, new_root: &Path, options: RelocateOptions) -> CoreResult<()> {
        self.lifecycle
            .run_stopped(&self.identifier, || self.move_tree(new_root, options))
    }

    fn move_tree(&self, new_root: &Path, options: RelocateOptions) -> CoreResult<()> {
        let tables = self.tables.read().clone();
        let pages = self.pages.read().clone();
        for table in &tables {
            table.ensure_state(LifecycleState::Shutdown)?;
        }
        for page in &pages {
            page.ensure_state(LifecycleState::Shutdown)?;
        }

        let old_root = self.root();
        if resolve(new_root).starts_with(resolve(&old_root)) {
            return Err(CoreError::invalid_operation(format!(
                "cannot relocate {} into {}",
                old_root.display(),
                new_root.display()
            )));
        }

        let copied = if old_root.exists() {
            copy_dir_all(&old_root, new_root, options.overwrite)?
        } else {
            fs::create_dir_all(new_root)?;
            0
        };

        for table in &tables {
            table.set_directory(&new_root.join(TABLES_DIR).join(table.identifier()))?;
        }
        for page in &pages {
            page.set_directory(&new_root.join(PAGES_DIR).join(page.identifier()))?;
        }
        *self.root.write() = new_root.to_path_buf();

        if !options.keep_old_source && old_root.exists() {
            fs::remove_dir_all(&old_root)?;
        }

        info!(
            database = %self.identifier,
            from = %old_root.display(),
            to = %new_root.display(),
            files = copied,
            "relocated database"
        );
        Ok(())
    }

    fn start(&self) -> CoreResult<()> {
        let root = self.root();
        fs::create_dir_all(&root)?;
        self.lock_directory(&root)?;

        let result = self.claim_directory(&root).and_then(|()| self.start_entities());
        if let Err(e) = result {
            self.unlock_directory();
            return Err(e);
        }

        info!(database = %self.identifier, root = %root.display(), "database started");
        Ok(())
    }

    fn stop(&self) -> CoreResult<()> {
        let tables = self.tables.read().clone();
        let pages = self.pages.read().clone();

        let table_error = shutdown_each(&tables);
        let page_error = shutdown_each(&pages);
        self.unlock_directory();

        info!(database = %self.identifier, "database stopped");
        match table_error.or(page_error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn claim_directory(&self, root: &Path) -> CoreResult<()> {
        match DatabaseInfo::read(root)? {
            Some(info) if info.identifier != self.identifier => Err(CoreError::DirectoryAlreadyUsed {
                path: root.to_path_buf(),
                owner: info.identifier,
            }),
            Some(_) => Ok(()),
            None => DatabaseInfo::new(&self.identifier).write(root),
        }
    }

    fn start_entities(&self) -> CoreResult<()> {
        let tables = self.tables.read().clone();
        let pages = self.pages.read().clone();

        startup_each(&tables)?;
        if let Err(e) = startup_each(&pages) {
            shutdown_each(&tables);
            return Err(e);
        }
        Ok(())
    }

    fn lock_directory(&self, root: &Path) -> CoreResult<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked {
                path: root.to_path_buf(),
            });
        }
        *self.dir_lock.lock() = Some(file);
        Ok(())
    }

    fn unlock_directory(&self) {
        if let Some(file) = self.dir_lock.lock().take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!(database = %self.identifier, error = %e, "could not unlock directory");
            }
        }
    }
}

/// Starts each entity in order. On failure, the ones already started are
/// shut down again in reverse order.
fn startup_each<E: Lifecycle + ?Sized>(entities: &[Arc<E>]) -> CoreResult<()> {
    for (index, entity) in entities.iter().enumerate() {
        if let Err(e) = entity.startup() {
            for started in entities[..index].iter().rev() {
                if let Err(stop) = started.shutdown() {
                    warn!(entity = started.identifier(), error = %stop, "rollback shutdown failed");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Shuts down every running entity. Returns the first failure.
fn shutdown_each<E: Lifecycle + ?Sized>(entities: &[Arc<E>]) -> Option<CoreError> {
    let mut first = None;
    for entity in entities {
        if entity.state() != LifecycleState::Running {
            continue;
        }
        if let Err(e) = entity.shutdown() {
            warn!(entity = entity.identifier(), error = %e, "shutdown failed");
            first.get_or_insert(e);
        }
    }
    first
}

/// Absolute form of `path` with every existing prefix canonicalized.
pub(crate) fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

impl Lifecycle for Database {
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

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("identifier", &self.identifier)
            .field("root", &self.root())
            .field("state", &self.state())
            .field("tables", &self.tables.read().len())
            .field("pages", &self.pages.read().len())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.state() == LifecycleState::Running {
            if let Err(e) = self.shutdown() {
                warn!(database = %self.identifier, error = %e, "shutdown on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Lockable;
    use filedb_codec::Format;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Customer {
        id: u32,
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Counter {
        value: u64,
    }

    fn customer(id: u32) -> Customer {
        Customer {
            id,
            name: format!("customer {id}"),
        }
    }

    fn create_db(root: &Path) -> Database {
        let config = DatabaseConfig::new()
            .default_lock_timeout(Duration::from_millis(200))
            .shutdown_timeout(Duration::from_millis(200));
        let db = Database::new("crm", root, config).unwrap();
        db.register_table(TableOptions::keyed("customers", |c: &Customer| c.id))
            .unwrap();
        db.register_page(PageOptions::<Counter>::with_default("counter"))
            .unwrap();
        db
    }

    #[test]
    fn invalid_identifier_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Database::new("a/b", dir.path(), DatabaseConfig::new()),
            Err(CoreError::InvalidIdentifier { .. })
        ));

        let db = create_db(dir.path());
        let result = db.register_table(TableOptions::keyed("..", |c: &Customer| c.id));
        assert!(matches!(result, Err(CoreError::InvalidIdentifier { .. })));
    }

    #[test]
    fn duplicate_registration_fails() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());

        let result = db.register_table(TableOptions::keyed("customers", |c: &Customer| c.id));
        assert!(matches!(result, Err(CoreError::TableAlreadyExists { .. })));

        let result = db.register_page(PageOptions::<Counter>::with_default("counter"));
        assert!(matches!(result, Err(CoreError::PageAlreadyExists { .. })));
    }

    #[test]
    fn registration_requires_shutdown() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());
        db.startup().unwrap();

        let result = db.register_table(TableOptions::keyed("late", |c: &Customer| c.id));
        assert!(matches!(result, Err(CoreError::InvalidState { .. })));
    }

    #[test]
    fn startup_starts_everything_and_claims_directory() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());
        db.startup().unwrap();

        assert_eq!(db.state(), LifecycleState::Running);
        assert!(db
            .tables()
            .iter()
            .all(|t| t.state == LifecycleState::Running));
        assert!(dir.path().join("Database.info").exists());
        assert!(dir.path().join("Tables/customers/Data.json").exists());

        db.shutdown().unwrap();
        assert_eq!(db.state(), LifecycleState::Shutdown);
        assert!(db
            .tables()
            .iter()
            .all(|t| t.state == LifecycleState::Shutdown));
    }

    #[test]
    fn directory_of_another_database_is_refused() {
        let dir = tempdir().unwrap();
        DatabaseInfo::new("billing").write(dir.path()).unwrap();

        let db = create_db(dir.path());
        let err = db.startup().unwrap_err();
        assert!(matches!(err, CoreError::DirectoryAlreadyUsed { owner, .. } if owner == "billing"));
        assert_eq!(db.state(), LifecycleState::Shutdown);
        assert!(db
            .tables()
            .iter()
            .all(|t| t.state == LifecycleState::Shutdown));
    }

    #[test]
    fn second_instance_on_same_root_is_locked_out() {
        let dir = tempdir().unwrap();
        let first = create_db(dir.path());
        first.startup().unwrap();

        let second = create_db(dir.path());
        assert!(matches!(
            second.startup(),
            Err(CoreError::DatabaseLocked { .. })
        ));

        first.shutdown().unwrap();
        second.startup().unwrap();
    }

    #[test]
    fn failing_table_rolls_back_startup() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());
        db.register_page(PageOptions::<Counter>::with_default("visits"))
            .unwrap();
        let broken = db
            .register_table(TableOptions::keyed("broken", |c: &Customer| c.id))
            .unwrap();

        let broken_dir = broken.directory();
        fs::create_dir_all(&broken_dir).unwrap();
        fs::write(broken_dir.join("Data.json"), b"garbage").unwrap();

        assert!(db.startup().is_err());
        assert_eq!(db.state(), LifecycleState::Shutdown);
        assert!(db
            .tables()
            .iter()
            .all(|t| t.state == LifecycleState::Shutdown));

        // The directory lock is released, so a fixed database can start.
        fs::remove_file(broken_dir.join("Data.json")).unwrap();
        db.startup().unwrap();
    }

    #[test]
    fn connect_requires_running() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());
        assert!(matches!(
            db.connect(),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn transaction_commits_on_ok_and_aborts_on_err() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());
        db.startup().unwrap();

        db.transaction(|conn| conn.insert("customers", &customer(1)))
            .unwrap();

        let result: CoreResult<()> = db.transaction(|conn| {
            conn.insert("customers", &customer(2))?;
            Err(CoreError::invalid_operation("changed my mind"))
        });
        assert!(result.is_err());

        let names = db
            .transaction(|conn| conn.get_all::<Customer>("customers"))
            .unwrap();
        assert_eq!(names, vec![customer(1)]);
    }

    #[test]
    fn typed_table_lookup() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());

        let table = db.table::<Customer>("customers").unwrap();
        assert_eq!(table.identifier(), "customers");
        assert_eq!(table.format(), Format::Json);

        assert!(matches!(
            db.table::<Counter>("customers"),
            Err(CoreError::TableTypeMismatch { .. })
        ));
        assert!(matches!(
            db.table::<Customer>("missing"),
            Err(CoreError::TableNotFound { .. })
        ));
    }

    #[test]
    fn pages_read_and_write() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());
        db.startup().unwrap();

        assert_eq!(db.read_page::<Counter>("counter").unwrap().value, 0);
        db.write_page("counter", &Counter { value: 3 }).unwrap();
        assert_eq!(db.read_page::<Counter>("counter").unwrap().value, 3);

        assert!(matches!(
            db.read_page::<Customer>("counter"),
            Err(CoreError::PageNotFound { .. })
        ));
        assert!(matches!(
            db.read_page::<Counter>("missing"),
            Err(CoreError::PageNotFound { .. })
        ));
        assert_eq!(db.page_ids(), vec!["counter".to_string()]);
    }

    #[test]
    fn relocate_moves_tree() {
        let dir = tempdir().unwrap();
        let old_root = dir.path().join("old");
        let new_root = dir.path().join("new");

        let db = create_db(&old_root);
        db.startup().unwrap();
        db.transaction(|conn| conn.insert("customers", &customer(1)))
            .unwrap();
        db.write_page("counter", &Counter { value: 9 }).unwrap();
        db.shutdown().unwrap();

        db.relocate(&new_root, RelocateOptions::new()).unwrap();

        assert!(!old_root.exists());
        assert_eq!(db.root(), new_root);
        assert_eq!(
            db.table::<Customer>("customers").unwrap().directory(),
            new_root.join("Tables/customers")
        );

        db.startup().unwrap();
        let found = db
            .transaction(|conn| conn.get_one("customers", |c: &Customer| c.id == 1))
            .unwrap();
        assert_eq!(found, customer(1));
        assert_eq!(db.read_page::<Counter>("counter").unwrap().value, 9);
    }

    #[test]
    fn relocate_keeps_old_tree_on_request() {
        let dir = tempdir().unwrap();
        let old_root = dir.path().join("old");
        let db = create_db(&old_root);
        db.startup().unwrap();
        db.shutdown().unwrap();

        db.relocate(
            &dir.path().join("copy"),
            RelocateOptions::new().keep_old_source(true),
        )
        .unwrap();
        assert!(old_root.join("Database.info").exists());
    }

    #[test]
    fn startup_refused_while_relocating() {
        let dir = tempdir().unwrap();
        let old_root = dir.path().join("old");
        let new_root = dir.path().join("new");
        let db = create_db(&old_root);
        db.startup().unwrap();
        db.shutdown().unwrap();

        let filler = old_root.join("filler");
        fs::create_dir_all(&filler).unwrap();
        for i in 0..3000 {
            fs::write(filler.join(format!("{i}.bin")), [0u8; 64]).unwrap();
        }

        let (relocated, refused) = std::thread::scope(|scope| {
            let mover = scope.spawn(|| db.relocate(&new_root, RelocateOptions::new()));
            let mut refused = None;
            while !mover.is_finished() {
                if db.state() == LifecycleState::ShuttingDown {
                    refused = Some(db.startup());
                    break;
                }
                std::thread::yield_now();
            }
            (mover.join().unwrap(), refused)
        });

        relocated.unwrap();
        let refused = refused.expect("relocation finished before it was observed");
        assert!(matches!(
            refused,
            Err(CoreError::InvalidState {
                actual: LifecycleState::ShuttingDown,
                ..
            })
        ));
        assert_eq!(db.state(), LifecycleState::Shutdown);
        assert_eq!(db.root(), new_root);
        assert!(!old_root.exists());

        db.startup().unwrap();
        assert!(new_root.join("filler/2999.bin").exists());
    }

    #[test]
    fn relocate_rejects_nested_target_and_running_database() {
        let dir = tempdir().unwrap();
        let db = create_db(dir.path());
        db.startup().unwrap();

        assert!(matches!(
            db.relocate(&dir.path().join("elsewhere"), RelocateOptions::new()),
            Err(CoreError::InvalidState { .. })
        ));

        db.shutdown().unwrap();
        assert!(matches!(
            db.relocate(&dir.path().join("inner"), RelocateOptions::new()),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            db.relocate(dir.path(), RelocateOptions::new()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn relocate_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let old_root = dir.path().join("old");
        let new_root = dir.path().join("new");
        fs::create_dir_all(&new_root).unwrap();
        fs::write(new_root.join("Database.info"), b"crm|box|2024-01-01T00:00:00Z").unwrap();

        let db = create_db(&old_root);
        db.startup().unwrap();
        db.shutdown().unwrap();

        assert!(matches!(
            db.relocate(&new_root, RelocateOptions::new()),
            Err(CoreError::Storage(_))
        ));
        assert_eq!(db.root(), old_root);

        db.relocate(&new_root, RelocateOptions::new().overwrite(true))
            .unwrap();
        assert_eq!(db.root(), new_root);
    }

    #[test]
    fn drop_shuts_down() {
        let dir = tempdir().unwrap();
        let table = {
            let db = create_db(dir.path());
            db.startup().unwrap();
            db.table::<Customer>("customers").unwrap()
        };
        assert_eq!(table.state(), LifecycleState::Shutdown);
        assert!(table.acquire().is_err());
    }
}
