//! Model-checking harness for integration tests.
//!
//! Tracks the expected contents of the orders table next to a real
//! database, so tests can verify them after commits, aborts and restarts.

use crate::fixtures::{Order, TestDatabase, ORDERS};
use crate::generators::TableOperation;
use filedb_core::{CoreResult, Format};

/// A test harness pairing a database with the orders it should hold.
pub struct IntegrationHarness {
    /// The database under test.
    pub db: TestDatabase,
    expected: Vec<Order>,
}

impl IntegrationHarness {
    /// Creates a harness over a fresh JSON database.
    pub fn new() -> Self {
        Self::with_format(Format::Json)
    }

    /// Creates a harness whose orders table uses `format`.
    pub fn with_format(format: Format) -> Self {
        Self {
            db: TestDatabase::with_format(format),
            expected: Vec::new(),
        }
    }

    /// Applies `ops` in one connection and commits.
    pub fn commit(&mut self, ops: &[TableOperation]) -> CoreResult<()> {
        self.db.transaction(|conn| {
            for op in ops {
                op.apply(conn)?;
            }
            Ok(())
        })?;
        for op in ops {
            op.apply_to_model(&mut self.expected);
        }
        Ok(())
    }

    /// Applies `ops` in one connection and aborts. The model is unchanged.
    pub fn abort(&self, ops: &[TableOperation]) -> CoreResult<()> {
        let conn = self.db.connect()?;
        for op in ops {
            op.apply(&conn)?;
        }
        conn.abort();
        Ok(())
    }

    /// Restarts the database, forcing the next read to come from disk.
    pub fn restart(&self) {
        self.db.restart();
    }

    /// Returns the orders the table should hold, in table order.
    pub fn expected(&self) -> &[Order] {
        &self.expected
    }

    /// Verifies that the table holds exactly the expected orders.
    pub fn verify_all(&self) {
        let actual = self
            .db
            .transaction(|conn| conn.get_all::<Order>(ORDERS))
            .expect("Failed to read orders");
        assert_eq!(actual, self.expected, "Orders table diverged from the model");
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}
