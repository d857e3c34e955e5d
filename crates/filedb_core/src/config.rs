//! Database configuration.

use filedb_storage::DEFAULT_RETENTION;
use std::time::Duration;

/// Configuration shared by a database and everything it owns.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// How long a connection waits for a table lock unless the table
    /// sets its own timeout.
    pub default_lock_timeout: Duration,

    /// How long shutdown waits for a data file to become free.
    pub shutdown_timeout: Duration,

    /// Number of backups kept per data file.
    pub backup_retention: usize,

    /// Whether format migration keeps the old data file and its backups.
    pub keep_old_source: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_lock_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            backup_retention: DEFAULT_RETENTION,
            keep_old_source: false,
        }
    }
}

impl DatabaseConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default lock acquisition timeout.
    #[must_use]
    pub const fn default_lock_timeout(mut self, timeout: Duration) -> Self {
        self.default_lock_timeout = timeout;
        self
    }

    /// Sets how long shutdown waits for busy files.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the number of retained backups per data file.
    #[must_use]
    pub const fn backup_retention(mut self, count: usize) -> Self {
        self.backup_retention = count;
        self
    }

    /// Sets whether format migration keeps the old data file.
    #[must_use]
    pub const fn keep_old_source(mut self, value: bool) -> Self {
        self.keep_old_source = value;
        self
    }
}
