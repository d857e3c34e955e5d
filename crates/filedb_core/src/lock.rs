//! Per-table mutual exclusion.
//!
//! A table hands out at most one [`TableLock`] at a time. Other callers wait
//! on a condition variable in slices of [`LOCK_POLL_INTERVAL`], re-checking
//! the table's lifecycle state on every wake-up. A caller whose timeout
//! elapses fails with [`CoreError::DeadLocked`] and leaves the table flagged
//! as deadlocked until the current holder releases it.

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{LifecycleState, StateCell};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest a waiter sleeps before re-checking the table.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Proof of exclusive access to one table.
///
/// Locks are single-use: commit, abort or a forced table shutdown
/// invalidates them for good.
#[derive(Debug)]
pub struct TableLock {
    table: String,
    token: Uuid,
    valid: Arc<AtomicBool>,
}

impl TableLock {
    /// Returns the identifier of the locked table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the unique token of this lock.
    #[must_use]
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Returns whether the lock has not been released yet.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// An entity guarded by a [`TableLock`].
pub trait Lockable {
    /// Returns how long [`Lockable::acquire`] waits.
    fn lock_timeout(&self) -> Duration;

    /// Waits up to `timeout` for exclusive access.
    fn try_acquire(&self, timeout: Duration) -> CoreResult<TableLock>;

    /// Waits up to the entity's own timeout for exclusive access.
    fn acquire(&self) -> CoreResult<TableLock> {
        self.try_acquire(self.lock_timeout())
    }

    /// Persists pending changes and releases `lock`.
    fn commit(&self, lock: TableLock) -> CoreResult<()>;

    /// Discards pending changes and releases `lock`.
    fn abort(&self, lock: TableLock) -> CoreResult<()>;

    /// Returns whether a lock is outstanding.
    fn is_locked(&self) -> bool;

    /// Returns whether a waiter timed out since the last release.
    fn is_deadlocked(&self) -> bool;
}

#[derive(Debug)]
struct Holder {
    token: Uuid,
    valid: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct SlotState {
    holder: Option<Holder>,
    deadlocked: bool,
}

/// The lock slot of one table.
#[derive(Debug, Default)]
pub(crate) struct LockSlot {
    state: Mutex<SlotState>,
    released: Condvar,
}

impl LockSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the slot and mints a new lock.
    pub(crate) fn acquire(
        &self,
        table: &str,
        timeout: Duration,
        lifecycle: &StateCell,
    ) -> CoreResult<TableLock> {
        lifecycle.ensure(table, LifecycleState::Running)?;

        let started = Instant::now();
        let deadline = started + timeout;
        let mut slot = self.state.lock();

        loop {
            lifecycle.ensure(table, LifecycleState::Running)?;

            if slot.holder.is_none() {
                let valid = Arc::new(AtomicBool::new(true));
                let token = Uuid::new_v4();
                slot.holder = Some(Holder {
                    token,
                    valid: Arc::clone(&valid),
                });
                debug!(table, %token, "acquired table lock");
                return Ok(TableLock {
                    table: table.to_string(),
                    token,
                    valid,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                slot.deadlocked = true;
                let waited = now - started;
                warn!(table, ?waited, "table lock timed out");
                return Err(CoreError::DeadLocked {
                    table: table.to_string(),
                    waited,
                });
            }

            let slice = LOCK_POLL_INTERVAL.min(deadline - now);
            debug!(table, ?slice, "waiting for table lock");
            self.released.wait_for(&mut slot, slice);
        }
    }

    /// Fails with [`CoreError::InvalidLock`] unless `lock` is the outstanding lock.
    pub(crate) fn validate(&self, table: &str, lock: &TableLock) -> CoreResult<()> {
        let slot = self.state.lock();
        match &slot.holder {
            Some(holder)
                if lock.table == table && holder.token == lock.token && lock.is_valid() =>
            {
                Ok(())
            }
            _ => Err(CoreError::invalid_lock(table)),
        }
    }

    /// Releases `lock`, waking every waiter.
    pub(crate) fn release(&self, table: &str, lock: &TableLock) -> CoreResult<()> {
        self.validate(table, lock)?;
        self.clear();
        debug!(table, token = %lock.token, "released table lock");
        Ok(())
    }

    /// Releases whatever lock is outstanding. Returns whether there was one.
    pub(crate) fn force_release(&self) -> bool {
        let had_holder = self.state.lock().holder.is_some();
        self.clear();
        had_holder
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state.lock().holder.is_some()
    }

    pub(crate) fn is_deadlocked(&self) -> bool {
        self.state.lock().deadlocked
    }

    fn clear(&self) {
        let mut slot = self.state.lock();
        if let Some(holder) = slot.holder.take() {
            holder.valid.store(false, Ordering::Release);
        }
        slot.deadlocked = false;
        drop(slot);
        self.released.notify_all();
    }
}
