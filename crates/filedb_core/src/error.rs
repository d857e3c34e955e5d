//! Error types for FileDB core.

use crate::lifecycle::LifecycleState;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in FileDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] filedb_storage::StorageError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] filedb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entity is not in the lifecycle state the operation needs.
    #[error("{entity} is {actual}, expected {expected}")]
    InvalidState {
        /// Identifier of the table, page or database.
        entity: String,
        /// The state the operation needs.
        expected: LifecycleState,
        /// The state the entity is in.
        actual: LifecycleState,
    },

    /// The connection was already committed or aborted.
    #[error("connection is closed")]
    ConnectionClosed,

    /// No cached record is identical to the one given.
    #[error("record not found in table '{table}'")]
    RecordNotFound {
        /// The table searched.
        table: String,
    },

    /// A predicate matched no record.
    #[error("no record in table '{table}' matches the predicate")]
    NoMatchingRecords {
        /// The table searched.
        table: String,
    },

    /// Table not registered.
    #[error("table not found: {table}")]
    TableNotFound {
        /// Identifier of the table.
        table: String,
    },

    /// Page not registered, or registered with another element type.
    #[error("page not found: {page}")]
    PageNotFound {
        /// Identifier of the page.
        page: String,
    },

    /// Database not registered.
    #[error("database not found: {database}")]
    DatabaseNotFound {
        /// Identifier of the database.
        database: String,
    },

    /// A table with this identifier is already registered.
    #[error("table already exists: {table}")]
    TableAlreadyExists {
        /// Identifier of the table.
        table: String,
    },

    /// A page with this identifier is already registered.
    #[error("page already exists: {page}")]
    PageAlreadyExists {
        /// Identifier of the page.
        page: String,
    },

    /// A database with this identifier is already registered.
    #[error("database already exists: {database}")]
    DatabaseAlreadyExists {
        /// Identifier of the database.
        database: String,
    },

    /// The directory belongs to another database or table.
    #[error("directory {} is already used by '{owner}'", path.display())]
    DirectoryAlreadyUsed {
        /// The claimed directory.
        path: PathBuf,
        /// Identifier recorded in the directory's info file.
        owner: String,
    },

    /// Another handle in this or another process runs the database.
    #[error("database directory is locked: {}", path.display())]
    DatabaseLocked {
        /// The database root.
        path: PathBuf,
    },

    /// A table was requested with a different element type than registered.
    #[error("table '{table}' stores {expected}, not {requested}")]
    TableTypeMismatch {
        /// Identifier of the table.
        table: String,
        /// The registered element type.
        expected: &'static str,
        /// The requested element type.
        requested: &'static str,
    },

    /// The lock presented is not the table's outstanding lock.
    #[error("invalid lock for table '{table}'")]
    InvalidLock {
        /// Identifier of the table.
        table: String,
    },

    /// The lock could not be acquired before the timeout elapsed.
    #[error("deadlocked on table '{table}' after {waited:?}")]
    DeadLocked {
        /// Identifier of the table.
        table: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// A data file failed validation.
    #[error("invalid source {}: {message}", path.display())]
    InvalidSource {
        /// The data file.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// No backup could repair a corrupt data file.
    #[error("could not restore table '{table}' from {attempted} backup(s)")]
    CouldNotRestoreBackup {
        /// Identifier of the table.
        table: String,
        /// Number of backups tried.
        attempted: usize,
    },

    /// An info file could not be parsed.
    #[error("invalid info file {}: {message}", path.display())]
    InvalidInfoFile {
        /// The info file.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// An info file names a format this build does not know.
    #[error("unknown format: {name}")]
    UnknownFormat {
        /// The recorded format name.
        name: String,
    },

    /// An identifier cannot be used as a directory name.
    #[error("invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid state error.
    pub fn invalid_state(
        entity: impl Into<String>,
        expected: LifecycleState,
        actual: LifecycleState,
    ) -> Self {
        Self::InvalidState {
            entity: entity.into(),
            expected,
            actual,
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(table: impl Into<String>) -> Self {
        Self::RecordNotFound {
            table: table.into(),
        }
    }

    /// Creates a no matching records error.
    pub fn no_matching_records(table: impl Into<String>) -> Self {
        Self::NoMatchingRecords {
            table: table.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    /// Creates a page not found error.
    pub fn page_not_found(page: impl Into<String>) -> Self {
        Self::PageNotFound { page: page.into() }
    }

    /// Creates a database not found error.
    pub fn database_not_found(database: impl Into<String>) -> Self {
        Self::DatabaseNotFound {
            database: database.into(),
        }
    }

    /// Creates an invalid lock error.
    pub fn invalid_lock(table: impl Into<String>) -> Self {
        Self::InvalidLock {
            table: table.into(),
        }
    }

    /// Creates an invalid source error.
    pub fn invalid_source(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid info file error.
    pub fn invalid_info_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidInfoFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid identifier error.
    pub fn invalid_identifier(identifier: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason,
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns whether the error means a data file is corrupt.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::InvalidSource { .. } | Self::Codec(_))
    }
}
