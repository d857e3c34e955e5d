//! # FileDB Core
//!
//! Embedded, file-backed record store.
//!
//! This crate provides:
//! - Tables: typed record lists persisted as one file each, with backups
//! - Table locks with timeout and deadlock reporting
//! - Connections that lock tables and commit or abort their changes
//! - Pages: single persisted values
//! - Format migration of table data
//! - Databases that own tables and pages, and a registry of databases
//! - Offline inspection of database directories
//!
//! The crate never installs a `tracing` subscriber; binaries decide where
//! logs go.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod database;
mod error;
mod info;
mod inspect;
mod lifecycle;
mod lock;
mod migration;
mod page;
mod registry;
mod source;
mod table;
mod types;

pub use config::DatabaseConfig;
pub use connection::Connection;
pub use database::{Database, RelocateOptions, PAGES_DIR, TABLES_DIR};
pub use error::{CoreError, CoreResult};
pub use info::{host_name, DatabaseInfo, TableInfo, DATABASE_INFO_FILE, TABLE_INFO_FILE};
pub use inspect::{relocate_tree, BackupChoice, DatabaseInspector, SourceStatus, TableReport};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use lock::{Lockable, TableLock, LOCK_POLL_INTERVAL};
pub use migration::{migrate_source, reconcile, MigrationOptions, Reconciliation};
pub use page::{Constructor, DynPage, Page, PageOptions, CONTENT_FILE_STEM};
pub use registry::Registry;
pub use source::{
    data_file_name, PersistenceBacked, SourceData, SourceMetadata, StorageObject, TableSource,
    BACKUP_DIR, DATA_FILE_STEM,
};
pub use table::{Comparator, DynTable, Table, TableOptions, TableStatus};
pub use types::{validate_identifier, ElementType, Record};

pub use filedb_codec::Format;
pub use filedb_storage::Backup;
