//! The blocking primitive every subsystem's wait path is built from.
//!
//! The teacher disables interrupts and spins under `IrqMutex` to get a
//! critical section; here there is no interrupt controller to mask, so a
//! [`Gate`] is just a `parking_lot::Mutex` guarding subsystem state plus a
//! `Condvar` to park on. `unlock_and_block` (the scheduler's
//! atomic-release-and-sleep primitive) becomes [`Gate::wait_while`], which
//! wraps `Condvar::wait_while` — the guard is released and the thread parked
//! in one step, closing the same lost-wakeup race the teacher's
//! `pending_wakeup` flag exists to plug.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// A `Mutex<T>` paired with a `Condvar`, the minimal critical section a
/// blocking primitive (semaphore, alarm list, socket state machine) needs.
pub struct Gate<T> {
    state: Mutex<T>,
    condvar: Condvar,
}

impl<T> Gate<T> {
    pub fn new(initial: T) -> Self {
        Self {
            state: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    /// Atomically release the lock and block until `wake_when` next returns
    /// `true` after a notification. Equivalent to the teacher's
    /// `unlock_and_block`: the guard never exists in an unlocked-but-awake
    /// state between release and park.
    pub fn wait_while<'a>(
        &'a self,
        mut guard: MutexGuard<'a, T>,
        mut wake_when: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        while !wake_when(&mut guard) {
            self.condvar.wait(&mut guard);
        }
        guard
    }

    /// As [`Gate::wait_while`], but gives up after `timeout` and returns
    /// whatever state the predicate last saw, along with whether it was
    /// satisfied.
    pub fn wait_while_timeout<'a>(
        &'a self,
        mut guard: MutexGuard<'a, T>,
        mut wake_when: impl FnMut(&mut T) -> bool,
        timeout: Duration,
    ) -> (MutexGuard<'a, T>, bool) {
        let deadline = Instant::now() + timeout;
        loop {
            if wake_when(&mut guard) {
                return (guard, true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return (guard, wake_when(&mut guard));
            }
            let result = self.condvar.wait_for(&mut guard, remaining);
            if result.timed_out() && !wake_when(&mut guard) {
                return (guard, false);
            }
        }
    }

    /// Wake one thread parked in `wait_while`.
    pub fn notify_one(&self) {
        self.condvar.notify_one();
    }

    /// Wake every thread parked in `wait_while`.
    pub fn notify_all(&self) {
        self.condvar.notify_all();
    }
}

/// A shareable [`Gate`], for the common case of a subsystem singleton handed
/// out to multiple threads (scheduler, alarm list, route cache).
pub type SharedGate<T> = Arc<Gate<T>>;
