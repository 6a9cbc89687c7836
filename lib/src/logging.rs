//! Structured logging init.
//!
//! All subsystems log through the `tracing` macros directly; this module
//! only owns process-wide subscriber setup, the way the teacher's `klog`
//! owns backend registration. Unlike `klog`, there is no custom backend
//! indirection to support — `tracing-subscriber`'s env-filter already gives
//! us the per-module level control `klog_set_level` hand-rolled.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a global `tracing` subscriber reading level filters from
/// `RUST_LOG`, defaulting to `info` when unset. Safe to call more than
/// once — only the first call takes effect, mirroring `klog_init`'s
/// idempotence during early boot.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .init();
    });
}
