//! Scenario 2: loopback datagram exchange between two miniports (§8).

use std::sync::Arc;

use mthreads_abi::config::SystemConfig;
use mthreads_abi::NetworkAddress;
use mthreads_net::link::FakeMesh;
use mthreads_net::{Miniroute, MiniportSystem};

#[test]
fn unbound_and_bound_ports_exchange_a_datagram() {
    let mesh = FakeMesh::new();
    let self_addr = NetworkAddress::new(1);

    let route = Miniroute::new(Arc::new(mesh.link_for(self_addr, None)), SystemConfig::default());
    let ports = MiniportSystem::new(route);

    let unbound = ports.open_unbound(42).expect("unbound port 42 free");
    let bound = ports.open_bound().expect("a bound port is available");

    let sent = b"hi";
    unbound
        .send(self_addr, bound.port(), sent)
        .expect("send to bound port");

    let (from, from_port, payload) = bound.receive();
    assert_eq!(from, self_addr);
    assert_eq!(from_port, 42);
    assert_eq!(payload, sent);
}
