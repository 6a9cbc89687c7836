//! Scenario 1: a spinner and a sleeper on the scheduler (§8).
//!
//! The spinner never calls `yield_now` — it should still demote out of band
//! 0 once its one-tick quantum expires, because the tick thread charges
//! quantum and preempts on its own (§4.1), not because the spinner checked
//! in. The sleeper should wake and run within its requested duration plus a
//! tick period or so of slack.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mthreads_abi::config::SystemConfig;
use mthreads_abi::task::HIGHEST_BAND;
use mthreads_lib::sync::Gate;
use mthreads_sched::Scheduler;

fn fast_config() -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.tick_period = Duration::from_millis(5);
    cfg
}

#[test]
fn spinner_demotes_and_sleeper_wakes_on_time() {
    let scheduler = Scheduler::new(fast_config());
    let spinner_band = Arc::new(AtomicU8::new(HIGHEST_BAND));
    let sleep_woke_at = Arc::new(std::sync::Mutex::new(None));
    let done = Arc::new(Gate::new(0u32));

    let band = Arc::clone(&spinner_band);
    let d = Arc::clone(&done);
    scheduler.spawn(move |sched, id| {
        // No checkpoint calls here on purpose: the tick thread has to
        // preempt this thread without its cooperation.
        let deadline = Instant::now() + Duration::from_millis(40);
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
        band.store(sched.band_of(id).unwrap_or(HIGHEST_BAND), Ordering::SeqCst);
        let mut g = d.lock();
        *g += 1;
        d.notify_all();
    });

    let started = Instant::now();
    let woke = Arc::clone(&sleep_woke_at);
    let d = Arc::clone(&done);
    scheduler.spawn(move |sched, id| {
        sched.sleep(id, Duration::from_millis(100));
        *woke.lock().unwrap() = Some(started.elapsed());
        let mut g = d.lock();
        *g += 1;
        d.notify_all();
    });

    let g = done.lock();
    let (g, finished) = done.wait_while_timeout(g, |count| *count == 2, Duration::from_secs(3));
    drop(g);
    assert!(finished, "both threads should finish");

    assert!(
        spinner_band.load(Ordering::SeqCst) > HIGHEST_BAND,
        "spinner should have demoted below band 0"
    );

    let woke_after = sleep_woke_at.lock().unwrap().expect("sleeper recorded a wake time");
    assert!(woke_after >= Duration::from_millis(95));
    assert!(woke_after <= Duration::from_millis(100) + fast_config().tick_period * 3);
}
