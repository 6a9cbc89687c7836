//! Scenario 6: bound-port exhaustion and reuse after release (§8).
//!
//! Every one of the 32768 bound ports (32768..=65535) gets allocated, the
//! next request must fail, and freeing one must make exactly that slot
//! (and only after the round-robin cursor cycles back around to it)
//! available again.

use std::sync::Arc;

use mthreads_abi::config::SystemConfig;
use mthreads_abi::NetworkAddress;
use mthreads_net::link::FakeMesh;
use mthreads_net::{Miniroute, MiniportSystem};

#[test]
fn bound_ports_exhaust_then_free_up_on_release() {
    let mesh = FakeMesh::new();
    let a = NetworkAddress::new(1);
    let route_a = Miniroute::new(Arc::new(mesh.link_for(a, None)), SystemConfig::default());
    let ports = MiniportSystem::new(route_a);

    let mut held = Vec::new();
    for _ in 0..(mthreads_abi::net::BOUND_PORT_MAX as u32 - mthreads_abi::net::BOUND_PORT_MIN as u32 + 1) {
        held.push(ports.open_bound().expect("a bound port should still be available"));
    }

    assert!(
        matches!(ports.open_bound(), Err(mthreads_net::NetError::NoMorePorts)),
        "every bound port is taken, the next request must fail"
    );

    // The round-robin cursor wrapped back to `BOUND_PORT_MIN` after handing
    // out the last port, so freeing the very first port allocated (also
    // `BOUND_PORT_MIN`) makes the next `open_bound` land on exactly that slot.
    let freed = held.remove(0);
    let freed_port = freed.port();
    drop(freed);

    let reused = ports.open_bound().expect("a released port should be available again");
    assert_eq!(reused.port(), freed_port, "the freed slot should be the one reused");
}
