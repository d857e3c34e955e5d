//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::fixtures::{Order, ORDERS};
use filedb_core::{Connection, CoreResult, Format};
use proptest::prelude::*;

/// Strategy for generating valid table and page identifiers.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for picking a storage format.
pub fn format_strategy() -> impl Strategy<Value = Format> {
    prop::sample::select(Format::ALL.to_vec())
}

/// Strategy for generating a single order with an id below `max_id`.
pub fn order_strategy(max_id: u64) -> impl Strategy<Value = Order> {
    (
        0..max_id,
        prop::string::string_regex("[a-z]{1,12}").expect("Invalid regex"),
        any::<u32>(),
    )
        .prop_map(|(id, customer, amount)| Order::new(id, customer, u64::from(amount)))
}

/// Strategy for generating orders with distinct ids.
pub fn orders_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<Order>> {
    prop::collection::vec(
        (
            prop::string::string_regex("[a-z ]{0,16}").expect("Invalid regex"),
            any::<u64>(),
        ),
        min..max,
    )
    .prop_map(|fields| {
        fields
            .into_iter()
            .enumerate()
            .map(|(id, (customer, amount))| Order::new(id as u64, customer, amount))
            .collect()
    })
}

/// A change applied to the orders table.
#[derive(Debug, Clone)]
pub enum TableOperation {
    /// Insert an order, replacing one with the same id
    Upsert(Order),
    /// Change the amount of an order if it exists
    Reprice {
        /// Order id
        id: u64,
        /// New amount
        amount_cents: u64,
    },
    /// Delete an order if it exists
    Delete {
        /// Order id
        id: u64,
    },
}

impl TableOperation {
    /// Applies the operation through `conn`.
    pub fn apply(&self, conn: &Connection<'_>) -> CoreResult<()> {
        match self {
            Self::Upsert(order) => {
                conn.delete_by(ORDERS, |o: &Order| o.id == order.id)?;
                conn.insert(ORDERS, order)
            }
            Self::Reprice { id, amount_cents } => conn
                .update_by(ORDERS, |o: &Order| o.id == *id, |o| {
                    o.amount_cents = *amount_cents;
                })
                .map(|_| ()),
            Self::Delete { id } => conn.delete_by(ORDERS, |o: &Order| o.id == *id).map(|_| ()),
        }
    }

    /// Applies the operation to an in-memory model of the table.
    pub fn apply_to_model(&self, model: &mut Vec<Order>) {
        match self {
            Self::Upsert(order) => {
                model.retain(|o| o.id != order.id);
                model.push(order.clone());
            }
            Self::Reprice { id, amount_cents } => {
                for order in model.iter_mut().filter(|o| o.id == *id) {
                    order.amount_cents = *amount_cents;
                }
            }
            Self::Delete { id } => model.retain(|o| o.id != *id),
        }
    }
}

/// Strategy for generating table operations over ids below `max_id`.
pub fn table_operation_strategy(max_id: u64) -> impl Strategy<Value = TableOperation> {
    prop_oneof![
        3 => order_strategy(max_id).prop_map(TableOperation::Upsert),
        1 => (0..max_id, any::<u32>()).prop_map(|(id, amount)| TableOperation::Reprice {
            id,
            amount_cents: u64::from(amount),
        }),
        1 => (0..max_id).prop_map(|id| TableOperation::Delete { id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TableOperation>> {
    prop::collection::vec(table_operation_strategy(16), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 512,
            max_shrink_iters: 5000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
