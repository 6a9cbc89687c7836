//! Top-level error vocabulary (§7).
//!
//! Subsystems narrow this down further (`mthreads_sched::SchedError`,
//! `mthreads_net::NetError`, `mthreads_fs::FsError`); this is the enum
//! those convert into at a module boundary, the way the teacher's drivers
//! collapse into a shared kernel error type at the syscall boundary.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiniError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("out of memory")]
    OutOfMemory,

    #[error("port already in use")]
    PortInUse,

    #[error("no more ports available")]
    NoMorePorts,

    #[error("send failed")]
    SendError,

    #[error("receive failed")]
    ReceiveError,

    #[error("operation timed out")]
    Timeout,
}
