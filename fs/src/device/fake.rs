//! An in-memory [`BlockDevice`] for tests: completions are delivered from a
//! background thread after a small simulated latency, with an optional
//! deterministic failure-every-Nth-write for exercising the error path.
//!
//! Shares the `Arc<Inner>`-plus-background-thread shape of
//! `mthreads_net::link::fake::FakeMesh` — the device handle is cheap to
//! clone and outlives any individual read/write it has in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mthreads_abi::fs::{BlockNum, BLOCK_SIZE};

use super::{BlockDevice, CompletionCallback};
use crate::error::FsError;

struct Inner {
    blocks: Mutex<HashMap<BlockNum, Vec<u8>>>,
    callback: Mutex<Option<CompletionCallback>>,
    latency: Duration,
    fail_every: Option<u32>,
    writes: AtomicU32,
}

pub struct FakeBlockDevice {
    inner: Arc<Inner>,
}

impl FakeBlockDevice {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::from_millis(1))
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                blocks: Mutex::new(HashMap::new()),
                callback: Mutex::new(None),
                latency,
                fail_every: None,
                writes: AtomicU32::new(0),
            }),
        })
    }

    /// A device that fails every `n`th write with [`FsError::IoError`].
    pub fn failing_every(n: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                blocks: Mutex::new(HashMap::new()),
                callback: Mutex::new(None),
                latency: Duration::from_millis(1),
                fail_every: Some(n),
                writes: AtomicU32::new(0),
            }),
        })
    }
}

impl BlockDevice for FakeBlockDevice {
    fn read_block(&self, blk: BlockNum, buf: Arc<Mutex<Vec<u8>>>) {
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            let data = inner
                .blocks
                .lock()
                .unwrap()
                .get(&blk)
                .cloned()
                .unwrap_or_else(|| vec![0u8; BLOCK_SIZE]);
            thread::sleep(inner.latency);
            *buf.lock().unwrap() = data;
            if let Some(cb) = inner.callback.lock().unwrap().as_ref() {
                cb(blk, Ok(()));
            }
        });
    }

    fn write_block(&self, blk: BlockNum, data: Vec<u8>) {
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            let attempt = inner.writes.fetch_add(1, Ordering::Relaxed) + 1;
            let should_fail = matches!(inner.fail_every, Some(n) if n > 0 && attempt % n == 0);
            if !should_fail {
                inner.blocks.lock().unwrap().insert(blk, data);
            }
            thread::sleep(inner.latency);
            if let Some(cb) = inner.callback.lock().unwrap().as_ref() {
                cb(blk, if should_fail { Err(FsError::IoError) } else { Ok(()) });
            }
        });
    }

    fn set_completion_callback(&self, callback: CompletionCallback) {
        *self.inner.callback.lock().unwrap() = Some(callback);
    }
}
