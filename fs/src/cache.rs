//! Block-I/O cache lock shim (§4.7).
//!
//! The [`BlockDevice`] trait is asynchronous: a read or write returns
//! immediately and signals completion later through a callback. Callers
//! that want synchronous-looking I/O register a fresh semaphore under the
//! block number being operated on, issue the request, then `P` it — the
//! completion callback looks the block number back up and `V`s the match.
//! Grounded in the teacher's `fs/buffer_cache.rs`, which does the same
//! rendezvous with a futex instead of a scheduler semaphore.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::trace;

use mthreads_abi::fs::BlockNum;
use mthreads_abi::task::ThreadId;
use mthreads_sched::{Scheduler, Semaphore};

use crate::device::BlockDevice;
use crate::error::FsError;

struct PendingOp {
    sem: Arc<Semaphore>,
    result: Mutex<Option<Result<(), FsError>>>,
}

/// Serializes async block I/O behind a blocking call, one in-flight
/// operation per block number per direction.
pub struct BlockCacheLock {
    device: Arc<dyn BlockDevice>,
    pending_reads: Mutex<HashMap<BlockNum, Arc<PendingOp>>>,
    pending_writes: Mutex<HashMap<BlockNum, Arc<PendingOp>>>,
}

impl BlockCacheLock {
    pub fn new(device: Arc<dyn BlockDevice>) -> Arc<Self> {
        let lock = Arc::new(Self {
            device: Arc::clone(&device),
            pending_reads: Mutex::new(HashMap::new()),
            pending_writes: Mutex::new(HashMap::new()),
        });

        let dispatch = Arc::clone(&lock);
        device.set_completion_callback(Box::new(move |blk, result| {
            dispatch.on_complete(blk, result);
        }));
        lock
    }

    fn on_complete(&self, blk: BlockNum, result: Result<(), FsError>) {
        let pending = self
            .pending_reads
            .lock()
            .unwrap()
            .get(&blk)
            .cloned()
            .or_else(|| self.pending_writes.lock().unwrap().get(&blk).cloned());
        match pending {
            Some(op) => {
                *op.result.lock().unwrap() = Some(result);
                op.sem.v();
            }
            None => trace!(block = blk, "completion with no pending operation"),
        }
    }

    /// Read `blk` into `buf` (resized to the device's block size), blocking
    /// the calling scheduler thread until the device signals completion.
    pub fn protected_read(
        &self,
        scheduler: &Arc<Scheduler>,
        thread_id: ThreadId,
        blk: BlockNum,
        buf: Arc<Mutex<Vec<u8>>>,
    ) -> Result<(), FsError> {
        let op = Arc::new(PendingOp {
            sem: Arc::new(Semaphore::new(0)),
            result: Mutex::new(None),
        });
        self.pending_reads.lock().unwrap().insert(blk, Arc::clone(&op));
        self.device.read_block(blk, buf);
        op.sem.p(scheduler, thread_id);
        self.pending_reads.lock().unwrap().remove(&blk);
        op.result.lock().unwrap().take().unwrap_or(Err(FsError::IoError))
    }

    /// Write `data` to `blk`, blocking until the device signals completion.
    pub fn protected_write(
        &self,
        scheduler: &Arc<Scheduler>,
        thread_id: ThreadId,
        blk: BlockNum,
        data: Vec<u8>,
    ) -> Result<(), FsError> {
        let op = Arc::new(PendingOp {
            sem: Arc::new(Semaphore::new(0)),
            result: Mutex::new(None),
        });
        self.pending_writes.lock().unwrap().insert(blk, Arc::clone(&op));
        self.device.write_block(blk, data);
        op.sem.p(scheduler, thread_id);
        self.pending_writes.lock().unwrap().remove(&blk);
        op.result.lock().unwrap().take().unwrap_or(Err(FsError::IoError))
    }
}
