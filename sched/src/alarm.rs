//! Alarm list: one-shot timers sorted by deadline (§3 Alarm, §4.3).
//!
//! Grounded in the teacher's sleep queue (`scheduler/sleep.rs`), which
//! upserts a (task, wake_tick) pair and sweeps for due entries off the
//! timer interrupt. Here a dedicated background thread stands in for that
//! timer, parking until the nearest deadline instead of polling every tick.
//!
//! `deregister`'s return value matters more than it looks: callers like the
//! minisocket retransmit loop register an alarm, then may win the race and
//! finish (e.g. an ACK arrives) before the alarm fires. `deregister`
//! reports whether the alarm had *already* fired by the time the cancel
//! attempt ran, so the caller can tell a genuine firing apart from a
//! no-op cancel and avoid acting on a wakeup that was already absorbed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use mthreads_lib::sync::Gate;

pub type AlarmId = u64;

struct AlarmEntry {
    id: AlarmId,
    deadline: Instant,
    fired: bool,
    callback: Option<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    entries: Vec<AlarmEntry>,
    shutdown: bool,
    /// Bumped on every `register`, so the driver thread can tell a fresh
    /// (possibly sooner) deadline apart from a spurious wakeup while it is
    /// parked waiting on an older one.
    generation: u64,
}

/// A sorted list of one-shot alarms, fired by a dedicated background thread.
pub struct AlarmList {
    inner: Gate<Inner>,
    next_id: AtomicU64,
}

impl AlarmList {
    pub fn new() -> Arc<Self> {
        let list = Arc::new(Self {
            inner: Gate::new(Inner {
                entries: Vec::new(),
                shutdown: false,
                generation: 0,
            }),
            next_id: AtomicU64::new(1),
        });
        let driver = Arc::clone(&list);
        thread::Builder::new()
            .name("mthreads-alarm".into())
            .spawn(move || driver.drive())
            .expect("failed to spawn alarm thread");
        list
    }

    /// Register a callback to fire after `delay`. Entries are kept sorted
    /// by deadline so the driver thread only ever inspects the head.
    pub fn register(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) -> AlarmId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;
        {
            let mut guard = self.inner.lock();
            let pos = guard
                .entries
                .binary_search_by(|e| e.deadline.cmp(&deadline))
                .unwrap_or_else(|p| p);
            guard.entries.insert(
                pos,
                AlarmEntry {
                    id,
                    deadline,
                    fired: false,
                    callback: Some(Box::new(callback)),
                },
            );
            guard.generation = guard.generation.wrapping_add(1);
        }
        self.inner.notify_all();
        id
    }

    /// Cancel an alarm. Returns `true` if it had already fired (the cancel
    /// was a no-op, the caller lost the race), `false` if it was still
    /// pending and has now been removed.
    pub fn deregister(&self, id: AlarmId) -> bool {
        let mut guard = self.inner.lock();
        if let Some(idx) = guard.entries.iter().position(|e| e.id == id) {
            let already_fired = guard.entries[idx].fired;
            if !already_fired {
                guard.entries.remove(idx);
            }
            already_fired
        } else {
            // Already fired and reaped by the driver thread.
            true
        }
    }

    fn drive(self: Arc<Self>) {
        loop {
            let (next_deadline, snapshot_gen) = {
                let guard = self.inner.lock();
                if guard.shutdown {
                    return;
                }
                (guard.entries.first().map(|e| e.deadline), guard.generation)
            };

            let guard = match next_deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        let wait = deadline - now;
                        let g = self.inner.lock();
                        let (g, _) = self.inner.wait_while_timeout(
                            g,
                            |inner| inner.shutdown || inner.generation != snapshot_gen,
                            wait,
                        );
                        g
                    } else {
                        self.inner.lock()
                    }
                }
                None => {
                    let g = self.inner.lock();
                    self.inner
                        .wait_while(g, |inner| inner.shutdown || !inner.entries.is_empty())
                }
            };
            drop(guard);

            self.fire_due();
        }
    }

    fn fire_due(&self) {
        let now = Instant::now();
        let due: Vec<AlarmEntry> = {
            let mut guard = self.inner.lock();
            if guard.shutdown {
                return;
            }
            let split = guard
                .entries
                .iter()
                .take_while(|e| e.deadline <= now)
                .count();
            guard
                .entries
                .drain(..split)
                .map(|mut e| {
                    e.fired = true;
                    e
                })
                .collect()
        };

        for entry in due {
            trace!(alarm_id = entry.id, "firing alarm");
            if let Some(cb) = entry.callback {
                cb();
            }
        }
    }

    pub fn shutdown(&self) {
        self.inner.lock().shutdown = true;
        self.inner.notify_all();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
