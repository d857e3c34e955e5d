//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use filedb_core::{Database, DatabaseConfig, Format, Lifecycle, Table, TableOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Identifier of the orders table every fixture registers.
pub const ORDERS: &str = "orders";

/// Identifier of every fixture database.
pub const TEST_DATABASE: &str = "test";

/// The record type used throughout the tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order number; identifies the record.
    pub id: u64,
    /// Customer name.
    pub customer: String,
    /// Total in cents.
    pub amount_cents: u64,
}

impl Order {
    /// Creates an order.
    pub fn new(id: u64, customer: impl Into<String>, amount_cents: u64) -> Self {
        Self {
            id,
            customer: customer.into(),
            amount_cents,
        }
    }
}

/// Returns `count` orders with ids `0..count`.
pub fn sample_orders(count: usize) -> Vec<Order> {
    (0..count as u64)
        .map(|id| Order::new(id, format!("customer-{}", id % 7), 100 + id * 25))
        .collect()
}

/// Registers the orders table on `db`.
pub fn register_orders(db: &Database, format: Format) -> Arc<Table<Order>> {
    db.register_table(TableOptions::keyed(ORDERS, |o: &Order| o.id).format(format))
        .expect("Failed to register orders table")
}

/// Configuration with short timeouts so failing tests fail fast.
pub fn fast_config() -> DatabaseConfig {
    DatabaseConfig::new()
        .default_lock_timeout(Duration::from_millis(500))
        .shutdown_timeout(Duration::from_millis(500))
}

/// A test database in a temporary directory.
///
/// The database is shut down before the directory is removed.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The orders table.
    pub orders: Arc<Table<Order>>,
    // Declared last so it is dropped after `db`.
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Creates a running database with a JSON orders table.
    pub fn new() -> Self {
        Self::with_format(Format::Json)
    }

    /// Creates a running database whose orders table uses `format`.
    pub fn with_format(format: Format) -> Self {
        let test_db = Self::stopped(fast_config(), format);
        test_db.db.startup().expect("Failed to start database");
        test_db
    }

    /// Creates a database with an orders table without starting it.
    pub fn stopped(config: DatabaseConfig, format: Format) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::new(TEST_DATABASE, temp_dir.path().join("db"), config)
            .expect("Failed to create database");
        let orders = register_orders(&db, format);

        Self {
            db,
            orders,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the temporary directory holding the database root.
    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Shuts the database down and starts it again, emptying every cache.
    pub fn restart(&self) {
        self.db.shutdown().expect("Failed to shut down database");
        self.db.startup().expect("Failed to restart database");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary running database.
///
/// # Example
///
/// ```rust,ignore
/// use filedb_testkit::{with_temp_db, ORDERS, Order};
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         db.transaction(|conn| conn.insert(ORDERS, &Order::new(1, "ada", 10)))
///             .unwrap();
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::new();
    f(&test_db.db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a running database holding `count` committed orders.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::new();
        test_db
            .transaction(|conn| conn.insert_many(ORDERS, &sample_orders(count)))
            .expect("Failed to insert orders");
        test_db
    }
}
