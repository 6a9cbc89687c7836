//! The externalized block-device collaborator (§4.7, §6).
//!
//! Real disk I/O is out of scope (a Non-goal, same as [`mthreads_net::Link`]
//! for NIC delivery): a [`BlockDevice`] implementation owns issuing the
//! async read/write and invoking the registered completion callback with
//! `(block_num, Result)`. Everything above this trait — the cache lock
//! shim — only ever sees `BlockDevice`, never a disk driver.

use std::sync::{Arc, Mutex};

use mthreads_abi::fs::BlockNum;

use crate::error::FsError;

pub type CompletionCallback = Box<dyn Fn(BlockNum, Result<(), FsError>) + Send + Sync>;

/// An asynchronous block-I/O device. `read_block`/`write_block` return
/// immediately; completion is signaled later via the callback registered
/// through [`set_completion_callback`](Self::set_completion_callback).
pub trait BlockDevice: Send + Sync {
    /// Begin reading `blk` into `buf`. `buf` must be `BLOCK_SIZE` bytes;
    /// the device fills it in place before invoking the callback.
    fn read_block(&self, blk: BlockNum, buf: Arc<Mutex<Vec<u8>>>);

    /// Begin writing `data` (`BLOCK_SIZE` bytes) to `blk`.
    fn write_block(&self, blk: BlockNum, data: Vec<u8>);

    /// Register the callback invoked once per completed read or write.
    /// Replaces any previously registered callback.
    fn set_completion_callback(&self, callback: CompletionCallback);
}

pub mod fake;
pub use fake::FakeBlockDevice;
