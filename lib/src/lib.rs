//! Host-side runtime services shared by the `mthreads` workspace.
//!
//! This crate has no scheduling policy of its own — it is the common
//! vocabulary that `mthreads-sched`, `mthreads-net`, and `mthreads-fs` all
//! build on: structured logging and the blocking primitive every
//! subsystem's wait path is built from.

pub mod logging;
pub mod sync;

pub use logging::init_logging;
pub use sync::Gate;
