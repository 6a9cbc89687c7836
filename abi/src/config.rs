//! Runtime-tunable system configuration (§1.1, §3 "SystemConfig (added)").
//!
//! The teacher bakes these as `const` items; we collect them into a struct
//! so `mthreads-tests` can vary tick period, retry counts, and quanta per
//! scenario without touching the subsystems themselves.

use crate::net::{
    DISCOVERY_MAX_ATTEMPTS, DISCOVERY_TIMEOUT_MS, MAX_ROUTE_LENGTH, RETRANSMIT_BASE_MS,
    RETRANSMIT_MAX_ATTEMPTS,
};
use crate::task::SWEEP_TICKS;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// Period of the scheduler's virtual clock tick.
    pub tick_period: Duration,

    /// Ticks each priority band is swept before rotating, highest to lowest.
    pub sweep_ticks: [u32; 4],

    /// Maximum source-routed hop count before a discovery is dropped.
    pub max_route_length: usize,

    /// Route discovery retry count and per-attempt timeout.
    pub discovery_max_attempts: u32,
    pub discovery_timeout: Duration,

    /// Minisocket retransmit schedule.
    pub retransmit_max_attempts: u32,
    pub retransmit_base: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            sweep_ticks: SWEEP_TICKS,
            max_route_length: MAX_ROUTE_LENGTH,
            discovery_max_attempts: DISCOVERY_MAX_ATTEMPTS,
            discovery_timeout: Duration::from_millis(DISCOVERY_TIMEOUT_MS),
            retransmit_max_attempts: RETRANSMIT_MAX_ATTEMPTS,
            retransmit_base: Duration::from_millis(RETRANSMIT_BASE_MS),
        }
    }
}
