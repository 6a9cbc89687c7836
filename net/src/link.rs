//! The externalized link-layer collaborator (§1, §6).
//!
//! Real hardware delivery is out of scope (a Non-goal): a [`Link`]
//! implementation owns getting bytes to a neighbor and calling back on
//! arrival. Everything above this trait — miniport, miniroute, minisocket —
//! only ever sees `Link`, never a NIC driver, the way the teacher's
//! netstack only ever sees `NetDev`.

use mthreads_abi::NetworkAddress;

use crate::error::NetError;

/// A single-hop unreliable broadcast link between mesh nodes.
pub trait Link: Send + Sync {
    /// This node's own address on the link.
    fn local_address(&self) -> NetworkAddress;

    /// Send `frame` to a specific neighbor. May be silently dropped by the
    /// implementation (e.g. the fake lossy link) — callers must not assume
    /// delivery.
    fn send(&self, next_hop: NetworkAddress, frame: &[u8]) -> Result<(), NetError>;

    /// Broadcast `frame` to every neighbor reachable on this link.
    fn broadcast(&self, frame: &[u8]) -> Result<(), NetError>;

    /// Register the callback invoked for every frame arriving on this link,
    /// whether unicast or broadcast. Replaces any previously registered
    /// callback.
    fn set_receive_callback(&self, callback: Box<dyn Fn(NetworkAddress, Vec<u8>) + Send + Sync>);
}

pub mod fake;
pub use fake::{FakeLink, FakeMesh};
