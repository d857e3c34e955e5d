//! # FileDB Storage
//!
//! File plumbing for FileDB.
//!
//! This crate provides the lowest-level file handling for FileDB. Files are
//! **opaque byte blobs** here: the storage layer never interprets what it
//! reads or writes.
//!
//! ## Design Principles
//!
//! - Every file is read and written as a whole
//! - Writes are atomic (write-then-rename), so a crash never leaves a torn file
//! - Cross-process exclusion uses advisory locks on sidecar `.lock` files
//! - Backups are plain copies with a bounded retention
//!
//! ## Components
//!
//! - [`StorageFile`] - A locked, atomically rewritten file
//! - [`BackupSet`] - Timestamped snapshots of one storage file
//! - [`fs`] - Helpers for atomic writes and directory copies
//!
//! ## Example
//!
//! ```rust
//! use filedb_storage::{BackupSet, StorageFile};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let file = StorageFile::new(&dir.path().join("Data.json"));
//! file.write(b"[]").unwrap();
//!
//! let backups = BackupSet::new(&dir.path().join("BackUps"), "Data.json", 5);
//! let backup = backups.create(&file).unwrap().unwrap();
//! assert_eq!(backups.latest().unwrap(), Some(backup));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod error;
mod file;
pub mod fs;

pub use backup::{Backup, BackupSet, DEFAULT_RETENTION};
pub use error::{StorageError, StorageResult};
pub use file::StorageFile;
