//! Multi-level feedback queue scheduler (§4.1).
//!
//! The teacher's scheduler context-switches between `Task`s it saves and
//! restores registers for, driven off the hardware timer interrupt. Here
//! the context switch is externalized to real OS threads (§1), but the tick
//! thread still stands in for the timer interrupt in the way that matters:
//! it is the tick thread, not the running thread, that charges quantum
//! against whoever holds the run permit and demotes them the instant it
//! runs out — a thread that never calls [`Scheduler::yield_now`] is still
//! knocked off the permit at the next sweep boundary (§4.1). The running
//! thread only learns about this the next time it reaches a
//! [`Scheduler::yield_now`] checkpoint; until then it keeps executing on its
//! real OS thread, same as a preempted task keeps occupying memory until the
//! next context switch actually runs it off the CPU.
//!
//! There is no idle thread: with no physical CPU to occupy, an empty ready
//! set just means the tick thread naps until someone calls [`Scheduler::spawn`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use mthreads_abi::config::SystemConfig;
use mthreads_abi::task::{quantum_for_band, ThreadId, ThreadStatus, HIGHEST_BAND, NUM_BANDS};
use mthreads_lib::sync::Gate;

use crate::alarm::AlarmList;
use crate::error::SchedError;
use crate::queue::MultilevelQueue;
use crate::thread::ThreadState;

struct Inner {
    ready: MultilevelQueue<ThreadId>,
    states: HashMap<ThreadId, ThreadState>,
    current: Option<ThreadId>,
    sweep_origin: u8,
    sweep_budget: u32,
    tick: u64,
    shutdown: bool,
}

impl Inner {
    fn new(config: &SystemConfig) -> Self {
        Self {
            ready: MultilevelQueue::new(),
            states: HashMap::new(),
            current: None,
            sweep_origin: HIGHEST_BAND,
            sweep_budget: config.sweep_ticks[HIGHEST_BAND as usize],
            tick: 0,
            shutdown: false,
        }
    }

    /// Advance the sweep's preferred search origin, per §4.1's per-band
    /// tick allotment (`sweep_ticks`). Rotating the origin — rather than
    /// always sweeping from band 0 — is what keeps a steady stream of
    /// band-0 work from starving band 3 entirely.
    fn advance_sweep(&mut self, config: &SystemConfig) {
        if self.sweep_budget == 0 {
            self.sweep_origin = (self.sweep_origin + 1) % NUM_BANDS as u8;
            self.sweep_budget = config.sweep_ticks[self.sweep_origin as usize];
        }
        self.sweep_budget = self.sweep_budget.saturating_sub(1);
    }

    fn pick_next(&mut self) -> Option<ThreadId> {
        self.ready.dequeue_sweep(self.sweep_origin).map(|(_, id)| id)
    }
}

/// A cooperative MLFQ scheduler layered over real OS threads.
pub struct Scheduler {
    inner: Gate<Inner>,
    config: SystemConfig,
    next_id: AtomicU64,
    alarms: Arc<AlarmList>,
}

impl Scheduler {
    pub fn new(config: SystemConfig) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            inner: Gate::new(Inner::new(&config)),
            config,
            next_id: AtomicU64::new(1),
            alarms: AlarmList::new(),
        });
        let ticker = Arc::clone(&scheduler);
        thread::Builder::new()
            .name("mthreads-tick".into())
            .spawn(move || ticker.tick_loop())
            .expect("failed to spawn tick thread");
        scheduler
    }

    /// Register and start a new thread at the highest priority band. The
    /// body runs on a real OS thread but only executes once it holds the
    /// run permit. It does not need to call [`Scheduler::yield_now`] for
    /// quantum exhaustion to be enforced — the tick thread charges and
    /// demotes on its own — but it does need to reach a checkpoint
    /// eventually to notice it has been preempted and queue up again.
    pub fn spawn<F>(self: &Arc<Self>, body: F) -> ThreadId
    where
        F: FnOnce(Arc<Scheduler>, ThreadId) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut guard = self.inner.lock();
            guard.states.insert(id, ThreadState::new(id, HIGHEST_BAND));
            guard.ready.enqueue(HIGHEST_BAND, id);
        }
        self.inner.notify_all();
        debug!(thread_id = id, "spawned thread at band {HIGHEST_BAND}");

        let scheduler = Arc::clone(self);
        thread::Builder::new()
            .name(format!("mthreads-{id}"))
            .spawn(move || {
                scheduler.wait_for_turn(id);
                body(Arc::clone(&scheduler), id);
                scheduler.terminate(id);
            })
            .expect("failed to spawn worker thread");
        id
    }

    fn wait_for_turn(&self, id: ThreadId) {
        let guard = self.inner.lock();
        let _guard = self.inner.wait_while(guard, |inner| {
            if inner.current.is_none() {
                if let Some(next) = inner.pick_next() {
                    inner.current = Some(next);
                }
            }
            inner.current == Some(id)
        });
    }

    /// Checkpoint. Quantum is charged by the tick thread regardless of
    /// whether this is ever called; this just notices if that has already
    /// cost the caller the run permit and, if so, blocks until it holds the
    /// permit again. A thread still holding the permit returns immediately.
    pub fn yield_now(self: &Arc<Self>, id: ThreadId) {
        let still_current = self.inner.lock().current == Some(id);
        if !still_current {
            self.wait_for_turn(id);
        }
    }

    /// Voluntarily give up the run permit without being charged for
    /// quantum exhaustion — the thread keeps its current band.
    pub fn yield_voluntarily(self: &Arc<Self>, id: ThreadId) {
        self.relinquish(id, false);
    }

    fn relinquish(self: &Arc<Self>, id: ThreadId, demote: bool) {
        {
            let mut guard = self.inner.lock();
            if let Some(state) = guard.states.get_mut(&id) {
                state.ticks_used = 0;
                if demote {
                    let lowest = (NUM_BANDS - 1) as u8;
                    state.band = (state.band + 1).min(lowest);
                }
                guard.ready.enqueue(state.band, id);
            }
            guard.current = None;
        }
        self.inner.notify_all();
        self.wait_for_turn(id);
    }

    /// Block the current thread until `condition` is met against shared
    /// state guarded by `gate`, releasing the run permit for the duration —
    /// the scheduler-level analogue of `unlock_and_block`.
    pub fn block_on<T>(
        self: &Arc<Self>,
        id: ThreadId,
        gate: &Gate<T>,
        condition: impl FnMut(&mut T) -> bool,
    ) {
        {
            let mut guard = self.inner.lock();
            if let Some(state) = guard.states.get_mut(&id) {
                state.status = ThreadStatus::Blocked;
            }
            guard.current = None;
        }
        self.inner.notify_all();

        let g = gate.lock();
        gate.wait_while(g, condition);

        {
            let mut guard = self.inner.lock();
            if let Some(state) = guard.states.get_mut(&id) {
                state.status = ThreadStatus::Ready;
                state.ticks_used = 0;
                guard.ready.enqueue(state.band, id);
            }
        }
        self.inner.notify_all();
        self.wait_for_turn(id);
    }

    /// Block the calling thread for `duration`, using the same alarm +
    /// `block_on` rendezvous as `unlock_and_block` (§3 Thread: "a private
    /// single-count semaphore used exclusively for timed sleep").
    pub fn sleep(self: &Arc<Self>, id: ThreadId, duration: Duration) {
        let wake_gate = Arc::new(Gate::new(false));
        let waker = Arc::clone(&wake_gate);
        self.alarms.register(duration, move || {
            *waker.lock() = true;
            waker.notify_all();
        });

        self.block_on(id, &*wake_gate, |woken| *woken);
    }

    fn terminate(&self, id: ThreadId) {
        let mut guard = self.inner.lock();
        if let Some(state) = guard.states.get_mut(&id) {
            state.status = ThreadStatus::Terminated;
        }
        guard.states.remove(&id);
        if guard.current == Some(id) {
            guard.current = None;
        }
        drop(guard);
        self.inner.notify_all();
        trace!(thread_id = id, "terminated");
    }

    /// The timer-interrupt stand-in: each tick, charge whoever holds the run
    /// permit and, if their quantum just ran out, demote and preempt them —
    /// a sweep boundary takes the permit away even if the thread never
    /// calls `yield_now` (§4.1). The preempted thread keeps running on its
    /// real OS thread until it next reaches a checkpoint; only the
    /// scheduler's bookkeeping of who holds the permit changes here.
    fn tick_loop(self: Arc<Self>) {
        loop {
            thread::sleep(self.config.tick_period);
            let mut guard = self.inner.lock();
            if guard.shutdown {
                return;
            }
            guard.tick += 1;
            guard.advance_sweep(&self.config);
            self.preempt_current_if_exhausted(&mut guard);
            drop(guard);
            self.inner.notify_all();
        }
    }

    /// Charge one tick against the running thread's quantum. If that
    /// exhausts it, demote one band (unless already at the lowest), requeue,
    /// and hand the permit to whoever's next in the sweep order — which may
    /// be the same thread again, if it's the only one ready.
    fn preempt_current_if_exhausted(&self, guard: &mut Inner) {
        let Some(id) = guard.current else { return };
        let exhausted = match guard.states.get_mut(&id) {
            Some(state) => {
                state.ticks_used += 1;
                state.ticks_used >= quantum_for_band(state.band)
            }
            None => false,
        };
        if !exhausted {
            return;
        }
        if let Some(state) = guard.states.get_mut(&id) {
            state.ticks_used = 0;
            let lowest = (NUM_BANDS - 1) as u8;
            state.band = (state.band + 1).min(lowest);
            guard.ready.enqueue(state.band, id);
        }
        guard.current = None;
        if let Some(next) = guard.pick_next() {
            guard.current = Some(next);
        }
        trace!(thread_id = id, "preempted at sweep boundary, quantum exhausted");
    }

    pub fn shutdown(&self) {
        self.inner.lock().shutdown = true;
    }

    pub fn total_ready(&self) -> usize {
        self.inner.lock().ready.total_len()
    }

    pub fn band_of(&self, id: ThreadId) -> Result<u8, SchedError> {
        self.inner
            .lock()
            .states
            .get(&id)
            .map(|s| s.band)
            .ok_or(SchedError::UnknownThread(id))
    }

    pub fn tick_count(&self) -> u64 {
        self.inner.lock().tick
    }
}
