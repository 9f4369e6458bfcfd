//! Level-triggered readiness flag guarding a value.
//!
//! The flag and the value it describes live under one mutex, so a reader that
//! observes `ready == true` also observes the fully written value. Waiters park
//! on a condition variable and re-check the flag after every wake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a blocked waiter sleeps between cancellation checks.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cooperative cancellation for blocking reads.
///
/// Clones share the same flag, so a signal handler can hold one clone while the
/// reader holds another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token after a cancelled wait has been handled.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of a wait that did not produce a ready value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// Non-blocking check found the flag down.
    Pending,
    /// The cancellation token fired before the flag went up.
    Cancelled,
    /// The signal was closed; it will never become ready again.
    Closed,
}

struct Slot<T> {
    ready: bool,
    closed: bool,
    value: T,
}

/// A value plus a readiness flag that waiters can block on.
pub struct ReadinessSignal<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T> ReadinessSignal<T> {
    /// Starts not ready.
    pub fn new(value: T) -> Self {
        Self {
            slot: Mutex::new(Slot {
                ready: false,
                closed: false,
                value,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Drop the flag. Readers arriving afterwards block (or get `Pending`).
    pub fn clear(&self) {
        self.lock().ready = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Raise the flag without touching the value and wake every waiter.
    /// No-op once closed.
    pub fn signal_ready(&self) {
        let mut slot = self.lock();
        slot.ready = !slot.closed;
        drop(slot);
        self.cond.notify_all();
    }

    /// Mutate the value, then raise the flag and wake every waiter.
    ///
    /// Both happen under the same lock, so no reader sees a partial update.
    /// After [`close`](Self::close) the value is still written but the flag stays down.
    pub fn publish<R>(&self, update: impl FnOnce(&mut T) -> R) -> R {
        let mut slot = self.lock();
        let out = update(&mut slot.value);
        slot.ready = !slot.closed;
        drop(slot);
        self.cond.notify_all();
        out
    }

    /// Read the value if ready, otherwise return [`NotReady::Pending`] immediately.
    pub fn try_with<R>(&self, read: impl FnOnce(&T) -> R) -> Result<R, NotReady> {
        let slot = self.lock();
        if slot.closed {
            Err(NotReady::Closed)
        } else if slot.ready {
            Ok(read(&slot.value))
        } else {
            Err(NotReady::Pending)
        }
    }

    /// Block until ready, then read the value.
    ///
    /// Returns [`NotReady::Cancelled`] if `cancel` fires first, or
    /// [`NotReady::Closed`] if the signal is closed. Both are checked before
    /// parking and on every wake.
    pub fn wait_with<R>(
        &self,
        cancel: &CancelToken,
        read: impl FnOnce(&T) -> R,
    ) -> Result<R, NotReady> {
        let mut slot = self.lock();
        while !slot.ready {
            if slot.closed {
                return Err(NotReady::Closed);
            }
            if cancel.is_cancelled() {
                return Err(NotReady::Cancelled);
            }
            slot = match self.cond.wait_timeout(slot, CANCEL_POLL_INTERVAL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        Ok(read(&slot.value))
    }

    /// Read the value regardless of the flag.
    pub fn peek<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.lock().value)
    }

    /// Reset the value, drop the flag for good and wake every waiter so it
    /// can observe [`NotReady::Closed`].
    pub fn close(&self, value: T) {
        let mut slot = self.lock();
        slot.value = value;
        slot.ready = false;
        slot.closed = true;
        drop(slot);
        self.cond.notify_all();
    }
}
