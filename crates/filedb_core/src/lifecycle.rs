//! Start/stop protocol shared by tables, pages and databases.
//!
//! Every stateful entity moves through the same four states:
//!
//! ```text
//! Shutdown ──startup()──► StartingUp ──► Running
//!    ▲                        │              │
//!    └──── (startup failed) ──┘         shutdown()
//!    │                                       ▼
//!    └─────────────────────────────── ShuttingDown
//! ```

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle state of a table, page or database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Stopped. Setup operations are allowed.
    #[default]
    Shutdown,
    /// Startup work is in progress.
    StartingUp,
    /// Live. Connections, locks and page access are allowed.
    Running,
    /// Shutdown work is in progress.
    ShuttingDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shutdown => "shutdown",
            Self::StartingUp => "starting up",
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}

/// An entity with a startup/shutdown lifecycle.
pub trait Lifecycle: Send + Sync {
    /// Returns the entity's identifier.
    fn identifier(&self) -> &str;

    /// Returns the current state.
    fn state(&self) -> LifecycleState;

    /// Moves the entity from `Shutdown` to `Running`.
    fn startup(&self) -> CoreResult<()>;

    /// Moves the entity from `Running` to `Shutdown`.
    fn shutdown(&self) -> CoreResult<()>;

    /// Fails with [`CoreError::InvalidState`] unless the entity is in `expected`.
    fn ensure_state(&self, expected: LifecycleState) -> CoreResult<()> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(CoreError::invalid_state(self.identifier(), expected, actual))
        }
    }
}

/// The lifecycle state of one entity behind its own mutex.
///
/// The mutex is only held for state reads and transitions, never while
/// startup or shutdown work runs.
#[derive(Debug, Default)]
pub(crate) struct StateCell {
    state: Mutex<LifecycleState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub(crate) fn ensure(&self, entity: &str, expected: LifecycleState) -> CoreResult<()> {
        let actual = self.get();
        if actual == expected {
            Ok(())
        } else {
            Err(CoreError::invalid_state(entity, expected, actual))
        }
    }

    /// Atomically moves from `from` to `to`.
    pub(crate) fn transition(
        &self,
        entity: &str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> CoreResult<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(CoreError::invalid_state(entity, from, *state));
        }
        *state = to;
        Ok(())
    }

    fn set(&self, to: LifecycleState) {
        *self.state.lock() = to;
    }

    /// Runs `work` as the startup of `entity`.
    ///
    /// On failure the state returns to `Shutdown` so startup can be retried.
    pub(crate) fn run_startup<F>(&self, entity: &str, work: F) -> CoreResult<()>
    where
        F: FnOnce() -> CoreResult<()>,
    {
        self.transition(entity, LifecycleState::Shutdown, LifecycleState::StartingUp)?;
        match work() {
            Ok(()) => {
                self.set(LifecycleState::Running);
                Ok(())
            }
            Err(e) => {
                self.set(LifecycleState::Shutdown);
                Err(e)
            }
        }
    }

    /// Runs `work` as the shutdown of `entity`.
    ///
    /// The entity ends up in `Shutdown` even when `work` fails.
    pub(crate) fn run_shutdown<F>(&self, entity: &str, work: F) -> CoreResult<()>
    where
        F: FnOnce() -> CoreResult<()>,
    {
        self.transition(entity, LifecycleState::Running, LifecycleState::ShuttingDown)?;
        let result = work();
        self.set(LifecycleState::Shutdown);
        result
    }

    /// Runs `work` on a stopped `entity`, holding it in `ShuttingDown`.
    ///
    /// Startup and registration fail with [`CoreError::InvalidState`] until
    /// `work` returns. The entity is back in `Shutdown` afterwards.
    pub(crate) fn run_stopped<F, R>(&self, entity: &str, work: F) -> CoreResult<R>
    where
        F: FnOnce() -> CoreResult<R>,
    {
        self.transition(entity, LifecycleState::Shutdown, LifecycleState::ShuttingDown)?;
        let result = work();
        self.set(LifecycleState::Shutdown);
        result
    }
}

/// Polls `check` until it returns true or `timeout` elapses.
///
/// Returns the last answer of `check`.
pub(crate) fn wait_until<F>(timeout: Duration, poll: Duration, mut check: F) -> CoreResult<bool>
where
    F: FnMut() -> CoreResult<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check()? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        thread::sleep(poll.min(deadline - now));
    }
}
