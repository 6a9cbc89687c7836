//! Per-thread scheduling state (§3 Thread, §4.1).
//!
//! The teacher's `Task` carries a full saved register context because it
//! context-switches by hand; here the host OS thread owns its own stack and
//! registers; this struct only tracks the part the MLFQ policy needs.

use mthreads_abi::task::{ThreadId, ThreadStatus};

#[derive(Debug, Clone)]
pub struct ThreadState {
    pub id: ThreadId,
    pub band: u8,
    pub ticks_used: u32,
    pub status: ThreadStatus,
}

impl ThreadState {
    pub fn new(id: ThreadId, band: u8) -> Self {
        Self {
            id,
            band,
            ticks_used: 0,
            status: ThreadStatus::Ready,
        }
    }
}
