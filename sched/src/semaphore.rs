//! Counting semaphore with FIFO waiter ordering (§3 Semaphore, §4.2).
//!
//! `P` (wait) and `V` (signal) are named after the classic Dijkstra
//! operations the spec uses. The teacher's futex wait queue blocks without
//! ordering guarantees and relies on the caller to re-check its own
//! condition; here we keep an explicit FIFO of waiter ids so the thread
//! that has waited longest is always the one that wakes, matching the
//! spec's "FIFO waiter queue" invariant.

use std::collections::VecDeque;
use std::sync::Arc;

use mthreads_abi::task::ThreadId;
use mthreads_lib::sync::Gate;

use crate::scheduler::Scheduler;

struct SemState {
    count: i64,
    waiters: VecDeque<ThreadId>,
}

pub struct Semaphore {
    state: Gate<SemState>,
}

impl Semaphore {
    pub fn new(initial: i64) -> Self {
        Self {
            state: Gate::new(SemState {
                count: initial,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// `P(s)` / wait. Atomically releases the scheduler run permit while
    /// blocked (`unlock_and_block`), and wakes in the order threads called
    /// this.
    pub fn p(&self, scheduler: &Arc<Scheduler>, id: ThreadId) {
        let mut guard = self.state.lock();
        if guard.count > 0 && guard.waiters.is_empty() {
            guard.count -= 1;
            return;
        }
        guard.waiters.push_back(id);
        drop(guard);

        scheduler.block_on(id, &self.state, |state| {
            state.count > 0 && state.waiters.front() == Some(&id)
        });

        let mut guard = self.state.lock();
        guard.count -= 1;
        guard.waiters.pop_front();
    }

    /// `V(s)` / signal. Wakes the longest-waiting blocked thread, if any.
    pub fn v(&self) {
        let mut guard = self.state.lock();
        guard.count += 1;
        drop(guard);
        self.state.notify_all();
    }

    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub fn count(&self) -> i64 {
        self.state.lock().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn wakes_waiters_in_fifo_order() {
        let sched = Scheduler::new({
            let mut cfg = mthreads_abi::config::SystemConfig::default();
            cfg.tick_period = Duration::from_millis(2);
            cfg
        });
        let sem = Arc::new(Semaphore::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut ids = Vec::new();
        for n in 0..3 {
            let sem = Arc::clone(&sem);
            let order = Arc::clone(&order);
            let id = sched.spawn(move |scheduler, id| {
                sem.p(&scheduler, id);
                order.lock().unwrap().push(n);
            });
            ids.push(id);
            std::thread::sleep(Duration::from_millis(15));
        }

        for _ in 0..3 {
            sem.v();
            std::thread::sleep(Duration::from_millis(15));
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
