//! Connection behaviour across threads and restarts.

use filedb_core::{CoreError, DatabaseConfig, Format, Lifecycle, Lockable};
use filedb_testkit::{fast_config, sample_orders, Order, TestDatabase, ORDERS};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn committed_insert_is_visible_as_independent_copy() {
    let db = TestDatabase::new();
    let order = Order::new(1, "ada", 250);
    db.transaction(|conn| conn.insert(ORDERS, &order)).unwrap();

    let conn = db.connect().unwrap();
    let mut found = conn.get_one(ORDERS, |o: &Order| o.id == 1).unwrap();
    assert_eq!(found, order);

    found.amount_cents = 0;
    let again = conn.get_one(ORDERS, |o: &Order| o.id == 1).unwrap();
    assert_eq!(again.amount_cents, 250);
}

#[test]
fn aborted_mutations_are_invisible() {
    let db = TestDatabase::new();
    db.transaction(|conn| conn.insert_many(ORDERS, &sample_orders(3)))
        .unwrap();

    let conn = db.connect().unwrap();
    conn.delete_by(ORDERS, |o: &Order| o.id < 2).unwrap();
    conn.insert(ORDERS, &Order::new(9, "zed", 1)).unwrap();
    conn.update_by(ORDERS, |_: &Order| true, |o| o.amount_cents = 0)
        .unwrap();
    conn.abort();

    let orders = db
        .transaction(|conn| conn.get_all::<Order>(ORDERS))
        .unwrap();
    assert_eq!(orders, sample_orders(3));
}

/// Orders table, JSON, 5 s timeout: the first connection inserts three
/// orders without committing, the second blocks until the commit and then
/// sees all three.
#[test]
fn waiting_connection_sees_committed_orders() {
    let db = TestDatabase::stopped(
        DatabaseConfig::new().default_lock_timeout(Duration::from_secs(5)),
        Format::Json,
    );
    db.startup().unwrap();

    let first = db.connect().unwrap();
    first.insert_many(ORDERS, &sample_orders(3)).unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();
    thread::scope(|scope| {
        scope.spawn(|| {
            let second = db.connect().unwrap();
            started_tx.send(()).unwrap();
            let orders = second.get_all::<Order>(ORDERS).unwrap();
            done_tx.send(orders).unwrap();
        });

        started_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(300));
        assert!(done_rx.try_recv().is_err(), "second connection did not block");

        first.commit().unwrap();
    });

    assert_eq!(done_rx.recv().unwrap(), sample_orders(3));
}

#[test]
fn lock_wait_times_out_within_one_poll_interval() {
    let timeout = Duration::from_millis(400);
    let db = TestDatabase::stopped(fast_config().default_lock_timeout(timeout), Format::Json);
    db.startup().unwrap();

    let holder = db.connect().unwrap();
    holder.count::<Order>(ORDERS).unwrap();

    let waiter = db.connect().unwrap();
    let started = Instant::now();
    let err = waiter.count::<Order>(ORDERS).unwrap_err();
    let elapsed = started.elapsed();

    match err {
        CoreError::DeadLocked { table, waited } => {
            assert_eq!(table, ORDERS);
            assert!(waited >= timeout);
        }
        other => panic!("expected DeadLocked, got {other:?}"),
    }
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + filedb_core::LOCK_POLL_INTERVAL + Duration::from_millis(400));
    assert!(db.orders.is_deadlocked());

    holder.commit().unwrap();
    assert!(!db.orders.is_deadlocked());
    assert_eq!(waiter.count::<Order>(ORDERS).unwrap(), 0);
}

#[test]
fn persisted_orders_load_in_order_after_restart() {
    for format in Format::ALL {
        let db = TestDatabase::with_format(format);
        let mut orders = sample_orders(20);
        orders.reverse();
        db.transaction(|conn| conn.insert_many(ORDERS, &orders))
            .unwrap();

        db.restart();
        let loaded = db
            .transaction(|conn| conn.get_all::<Order>(ORDERS))
            .unwrap();
        assert_eq!(loaded, orders);
    }
}

#[test]
fn direct_table_locking_without_connection() {
    let db = TestDatabase::new();

    let lock = db.orders.acquire().unwrap();
    db.orders.insert(&lock, &Order::new(5, "eve", 50)).unwrap();
    db.orders.commit(lock).unwrap();

    let lock = db.orders.acquire().unwrap();
    assert_eq!(db.orders.count(&lock).unwrap(), 1);
    db.orders.abort(lock).unwrap();
    assert!(!db.orders.is_locked());
}

#[test]
fn shutdown_revokes_outstanding_locks() {
    let db = TestDatabase::new();
    let lock = db.orders.acquire().unwrap();

    db.shutdown().unwrap();
    assert!(!lock.is_valid());

    db.startup().unwrap();
    assert!(matches!(
        db.orders.count(&lock),
        Err(CoreError::InvalidLock { .. })
    ));
    assert_eq!(db.orders.state(), filedb_core::LifecycleState::Running);
}
