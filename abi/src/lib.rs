//! Shared data types, wire constants, and error kinds for the `mthreads`
//! workspace.
//!
//! This crate has no logic of its own — it is the common vocabulary that
//! `mthreads-sched`, `mthreads-net`, and `mthreads-fs` all build on, the way
//! `slopos-abi` is the vocabulary shared by the teacher's scheduler, drivers,
//! and fs crates.

pub mod addr;
pub mod config;
pub mod error;
pub mod fs;
pub mod net;
pub mod task;

pub use addr::NetworkAddress;
pub use config::SystemConfig;
pub use error::MiniError;
