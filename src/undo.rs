//! Timed commit/undo for user actions.
//!
//! [`UndoCoordinator`] holds at most one pending action. When the window
//! elapses the commit callback fires; an explicit [`UndoCoordinator::undo`]
//! inside the window fires the undo callback instead. Exactly one of the two
//! callbacks runs per registered action.
//!
//! Registering while an action is pending commits the pending one first, so
//! undos never stack. [`UndoCoordinator::dismiss`] discards the pending
//! action without running either callback.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;

// ============================================================================
// UndoConfig
// ============================================================================

fn default_window_seconds() -> u64 {
    5
}

/// Undo window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UndoConfig {
    /// Seconds an action stays undoable.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
        }
    }
}

impl UndoConfig {
    /// Undo window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of [`UndoCoordinator::undo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoResult<T> {
    /// The action was reverted
    Success(T),
    /// The window elapsed; the action is committed
    Expired,
    /// Nothing to undo
    NoAction,
}

/// Result of [`UndoCoordinator::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome<T> {
    /// Previously pending action that was committed to make room
    pub superseded: Option<T>,
}

// ============================================================================
// UndoCoordinator
// ============================================================================

type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

struct Pending<T> {
    id: u64,
    action: T,
    deadline: Instant,
    on_commit: Callback<T>,
    on_undo: Callback<T>,
    timer: JoinHandle<()>,
}

enum Slot<T> {
    Empty,
    Pending(Pending<T>),
    Committed,
}

struct Inner<T> {
    slot: Slot<T>,
    next_id: u64,
}

/// Generic single-slot undo coordinator.
///
/// Cloning yields another handle to the same coordinator.
pub struct UndoCoordinator<T> {
    inner: Arc<Mutex<Inner<T>>>,
    config: UndoConfig,
}

impl<T> Clone for UndoCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl<T> UndoCoordinator<T>
where
    T: Clone + Send + std::fmt::Debug + 'static,
{
    /// Creates an empty coordinator.
    pub fn new(config: UndoConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slot: Slot::Empty,
                next_id: 0,
            })),
            config,
        }
    }

    /// Default undo window.
    pub fn default_window(&self) -> Duration {
        self.config.window()
    }

    /// Registers `action` with an undo window.
    ///
    /// A previously pending action is committed before this call returns.
    ///
    /// # Panics
    ///
    /// Must be called within a tokio runtime; the window timer is a spawned task.
    pub fn register<C, U>(
        &self,
        action: T,
        on_commit: C,
        on_undo: U,
        window: Duration,
    ) -> RegisterOutcome<T>
    where
        C: FnOnce(T) + Send + 'static,
        U: FnOnce(T) + Send + 'static,
    {
        let previous = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;

            let timer = tokio::spawn(Self::run_timer(Arc::clone(&self.inner), id, window));
            let pending = Pending {
                id,
                action: action.clone(),
                deadline: Instant::now() + window,
                on_commit: Box::new(on_commit),
                on_undo: Box::new(on_undo),
                timer,
            };
            std::mem::replace(&mut inner.slot, Slot::Pending(pending))
        };

        tracing::debug!(?action, ?window, "registered undoable action");

        let superseded = match previous {
            Slot::Pending(prev) => {
                prev.timer.abort();
                tracing::debug!(action = ?prev.action, "committing superseded action");
                let committed = prev.action.clone();
                (prev.on_commit)(prev.action);
                Some(committed)
            }
            Slot::Empty | Slot::Committed => None,
        };

        RegisterOutcome { superseded }
    }

    /// Registers `action` with the configured default window.
    pub fn register_default<C, U>(&self, action: T, on_commit: C, on_undo: U) -> RegisterOutcome<T>
    where
        C: FnOnce(T) + Send + 'static,
        U: FnOnce(T) + Send + 'static,
    {
        self.register(action, on_commit, on_undo, self.default_window())
    }

    /// Reverts the pending action if its window is still open.
    pub fn undo(&self) -> UndoResult<T> {
        let pending = {
            let mut inner = lock(&self.inner);
            match std::mem::replace(&mut inner.slot, Slot::Empty) {
                Slot::Pending(p) => {
                    p.timer.abort();
                    if Instant::now() >= p.deadline {
                        inner.slot = Slot::Committed;
                    }
                    p
                }
                Slot::Committed => {
                    inner.slot = Slot::Committed;
                    return UndoResult::Expired;
                }
                Slot::Empty => return UndoResult::NoAction,
            }
        };

        if Instant::now() >= pending.deadline {
            // Window elapsed but the timer had not fired yet.
            tracing::debug!(action = ?pending.action, "undo after window; committing");
            (pending.on_commit)(pending.action);
            return UndoResult::Expired;
        }

        tracing::info!(action = ?pending.action, "action undone");
        let action = pending.action.clone();
        (pending.on_undo)(pending.action);
        UndoResult::Success(action)
    }

    /// Stops tracking the pending action without committing or undoing it.
    pub fn dismiss(&self) -> Option<T> {
        let mut inner = lock(&self.inner);
        match std::mem::replace(&mut inner.slot, Slot::Empty) {
            Slot::Pending(p) => {
                p.timer.abort();
                tracing::debug!(action = ?p.action, "pending action dismissed");
                Some(p.action)
            }
            Slot::Empty | Slot::Committed => None,
        }
    }

    /// Commits the pending action now (e.g. the app is being backgrounded).
    pub fn commit_pending(&self) -> Option<T> {
        let pending = {
            let mut inner = lock(&self.inner);
            match std::mem::replace(&mut inner.slot, Slot::Empty) {
                Slot::Pending(p) => {
                    inner.slot = Slot::Committed;
                    p
                }
                other => {
                    inner.slot = other;
                    return None;
                }
            }
        };
        pending.timer.abort();
        let action = pending.action.clone();
        (pending.on_commit)(pending.action);
        Some(action)
    }

    /// The pending action, if any.
    pub fn pending(&self) -> Option<T> {
        match &lock(&self.inner).slot {
            Slot::Pending(p) => Some(p.action.clone()),
            Slot::Empty | Slot::Committed => None,
        }
    }

    /// Time left in the pending action's window.
    pub fn remaining(&self) -> Option<Duration> {
        match &lock(&self.inner).slot {
            Slot::Pending(p) => Some(p.deadline.saturating_duration_since(Instant::now())),
            Slot::Empty | Slot::Committed => None,
        }
    }

    async fn run_timer(inner: Arc<Mutex<Inner<T>>>, id: u64, window: Duration) {
        tokio::time::sleep(window).await;

        let pending = {
            let mut guard = lock(&inner);
            match std::mem::replace(&mut guard.slot, Slot::Empty) {
                Slot::Pending(p) if p.id == id => {
                    guard.slot = Slot::Committed;
                    p
                }
                other => {
                    guard.slot = other;
                    return;
                }
            }
        };

        tracing::debug!(action = ?pending.action, "undo window elapsed; committing");
        (pending.on_commit)(pending.action);
    }
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    // Callbacks never run under the lock, so a poisoned guard still holds consistent state.
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Tests
// ============================================================================
