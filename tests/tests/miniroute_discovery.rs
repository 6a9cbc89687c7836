//! Scenario 5: three-hop route discovery and caching (§8).
//!
//! A sends a datagram to C across an A-B-C chain with no prior route. The
//! Discovery/Reply round trip must populate A's cache with the path to C
//! (the single intermediate hop, B — path entries exclude both endpoints,
//! see `route.rs`'s module doc) before the datagram arrives.

use std::sync::Arc;
use std::time::Duration;

use mthreads_abi::config::SystemConfig;
use mthreads_abi::NetworkAddress;
use mthreads_net::link::FakeMesh;
use mthreads_net::{Miniroute, MiniportSystem};

fn config() -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.discovery_timeout = Duration::from_millis(500);
    cfg
}

#[test]
fn datagram_across_a_three_hop_chain_populates_the_route_cache() {
    let mesh = FakeMesh::new();
    let a = NetworkAddress::new(1);
    let b = NetworkAddress::new(2);
    let c = NetworkAddress::new(3);
    mesh.connect(a, b);
    mesh.connect(b, c);

    let route_a = Miniroute::new(Arc::new(mesh.link_for(a, None)), config());
    let _route_b = Miniroute::new(Arc::new(mesh.link_for(b, None)), config());
    let route_c = Miniroute::new(Arc::new(mesh.link_for(c, None)), config());

    assert!(route_a.cached_route(c).is_none(), "no route should be cached yet");

    let route_a_handle = Arc::clone(&route_a);
    let ports_a = MiniportSystem::new(route_a);
    let ports_c = MiniportSystem::new(route_c);

    let sender = ports_a.open_unbound(100).expect("unbound port on a");
    let listener = ports_c.open_bound().expect("bound port on c");

    sender
        .send(c, listener.port(), b"discovered-me")
        .expect("discovery + send to c");

    let (from, from_port, payload) = listener.receive();
    assert_eq!(from, a);
    assert_eq!(from_port, 100);
    assert_eq!(payload, b"discovered-me");

    let cached = route_a_handle
        .cached_route(c)
        .expect("a route to c should now be cached");
    assert_eq!(cached, vec![b], "the cached path excludes both endpoints");
}
