//! Process-wide set of databases.

use crate::config::DatabaseConfig;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{Lifecycle, LifecycleState};
use parking_lot::RwLock;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns a set of databases with distinct identifiers.
///
/// Dropping the registry shuts down every database still running.
#[derive(Default)]
pub struct Registry {
    databases: RwLock<Vec<Arc<Database>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database, creating its root directory if needed.
    pub fn create_database(
        &self,
        identifier: impl Into<String>,
        root: impl Into<PathBuf>,
        config: DatabaseConfig,
    ) -> CoreResult<Arc<Database>> {
        let identifier = identifier.into();
        let root = root.into();
        let mut databases = self.databases.write();

        if databases.iter().any(|db| db.identifier() == identifier) {
            return Err(CoreError::DatabaseAlreadyExists {
                database: identifier,
            });
        }

        let database = Arc::new(Database::new(identifier, root, config)?);
        fs::create_dir_all(database.root())?;
        databases.push(Arc::clone(&database));

        info!(database = database.identifier(), "registered database");
        Ok(database)
    }

    /// Returns the database `identifier`.
    pub fn database(&self, identifier: &str) -> CoreResult<Arc<Database>> {
        self.databases
            .read()
            .iter()
            .find(|db| db.identifier() == identifier)
            .cloned()
            .ok_or_else(|| CoreError::database_not_found(identifier))
    }

    /// Returns every database, in creation order.
    #[must_use]
    pub fn databases(&self) -> Vec<Arc<Database>> {
        self.databases.read().clone()
    }

    /// Removes a stopped database from the registry. Its files are kept.
    pub fn remove_database(&self, identifier: &str) -> CoreResult<Arc<Database>> {
        let mut databases = self.databases.write();
        let position = databases
            .iter()
            .position(|db| db.identifier() == identifier)
            .ok_or_else(|| CoreError::database_not_found(identifier))?;

        databases[position].ensure_state(LifecycleState::Shutdown)?;
        Ok(databases.remove(position))
    }

    /// Starts every stopped database, stopping at the first failure.
    pub fn start_all(&self) -> CoreResult<()> {
        for database in self.databases() {
            if database.state() == LifecycleState::Shutdown {
                database.startup()?;
            }
        }
        Ok(())
    }

    /// Starts every stopped database, continuing past failures.
    ///
    /// Returns the identifier and error of each database that failed.
    pub fn force_start_all(&self) -> Vec<(String, CoreError)> {
        let mut failures = Vec::new();
        for database in self.databases() {
            if database.state() != LifecycleState::Shutdown {
                continue;
            }
            if let Err(e) = database.startup() {
                warn!(database = database.identifier(), error = %e, "startup failed");
                failures.push((database.identifier().to_string(), e));
            }
        }
        failures
    }

    /// Shuts down every running database, stopping at the first failure.
    pub fn shutdown_all(&self) -> CoreResult<()> {
        for database in self.databases() {
            if database.state() == LifecycleState::Running {
                database.shutdown()?;
            }
        }
        Ok(())
    }

    /// Shuts down every running database, continuing past failures.
    pub fn force_shutdown_all(&self) -> Vec<(String, CoreError)> {
        let mut failures = Vec::new();
        for database in self.databases() {
            if database.state() != LifecycleState::Running {
                continue;
            }
            if let Err(e) = database.shutdown() {
                warn!(database = database.identifier(), error = %e, "shutdown failed");
                failures.push((database.identifier().to_string(), e));
            }
        }
        failures
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .databases
            .read()
            .iter()
            .map(|db| db.identifier().to_string())
            .collect();
        f.debug_struct("Registry").field("databases", &names).finish()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.force_shutdown_all();
    }
}
