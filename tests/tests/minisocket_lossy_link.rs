//! Scenario 4: a lossy link still delivers a full 4 KiB transfer (§8).
//!
//! The client's return link drops every other frame, so roughly half the
//! server's ACKs never arrive. `send_with_retransmit`'s exponential backoff
//! (§4.6) is what makes the single `send` call still succeed.

use std::sync::Arc;
use std::time::Duration;

use mthreads_abi::config::SystemConfig;
use mthreads_abi::NetworkAddress;
use mthreads_lib::sync::Gate;
use mthreads_net::link::FakeMesh;
use mthreads_net::{Miniroute, MinisocketSystem};
use mthreads_sched::{AlarmList, Scheduler};

fn fast_scheduler() -> Arc<Scheduler> {
    let mut cfg = SystemConfig::default();
    cfg.tick_period = Duration::from_millis(2);
    Scheduler::new(cfg)
}

#[test]
fn four_kib_transfer_survives_every_other_ack_dropped() {
    let mesh = FakeMesh::new();
    let server_addr = NetworkAddress::new(1);
    let client_addr = NetworkAddress::new(2);
    mesh.connect(server_addr, client_addr);

    let cfg = SystemConfig::default();
    // The server's outbound link carries the ACKs back to the client, so
    // dropping every 2nd frame sent *from* the server is what makes ACKs
    // go missing on the wire.
    let route_server = Miniroute::new(Arc::new(mesh.link_for(server_addr, Some(2))), cfg.clone());
    let route_client = Miniroute::new(Arc::new(mesh.link_for(client_addr, None)), cfg);

    let sockets_server = MinisocketSystem::new(route_server, AlarmList::new());
    let sockets_client = MinisocketSystem::new(route_client, AlarmList::new());

    let server = sockets_server.listen(11).expect("server socket on port 11");
    let client = sockets_client.connect_new().expect("client socket assigned");

    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();

    let scheduler = fast_scheduler();
    let done = Arc::new(Gate::new(0u32));
    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let server_socket = Arc::clone(&server);
    let done_server = Arc::clone(&done);
    let received_server = Arc::clone(&received);
    scheduler.spawn(move |sched, id| {
        server_socket.accept(&sched, id).expect("accept");
        let mut out = [0u8; 4096];
        loop {
            let n = server_socket.receive(&sched, id, &mut out).expect("receive");
            if n == 0 {
                break;
            }
            received_server.lock().extend_from_slice(&out[..n]);
        }
        let mut g = done_server.lock();
        *g += 1;
        done_server.notify_all();
    });

    let client_socket = Arc::clone(&client);
    let done_client = Arc::clone(&done);
    let send_buf = payload.clone();
    scheduler.spawn(move |sched, id| {
        client_socket
            .connect(&sched, id, server_addr, 11)
            .expect("connect");
        let n = client_socket.send(&sched, id, &send_buf).expect("send over a lossy link");
        assert_eq!(n, send_buf.len());
        let mut g = done_client.lock();
        *g += 1;
        done_client.notify_all();
    });

    let g = done.lock();
    let (g, finished) = done.wait_while_timeout(g, |count| *count == 2, Duration::from_secs(10));
    drop(g);
    assert!(finished, "lossy transfer did not complete in time");
    assert_eq!(received.lock().len(), 4096);
    assert_eq!(*received.lock(), payload);
}
