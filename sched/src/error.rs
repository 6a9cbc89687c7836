//! Scheduler-subsystem error type (§7).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedError {
    #[error("thread table is full")]
    ThreadTableFull,

    #[error("unknown thread id {0}")]
    UnknownThread(u64),

    #[error("semaphore count would underflow")]
    SemaphoreUnderflow,

    #[error("alarm id {0} not found")]
    UnknownAlarm(u64),
}
