//! Scenario 3: minisocket handshake and a multi-chunk stream transfer (§8).
//!
//! The client's `send` spans two chunks (`MINIMSG_MAX_MSG_SIZE` is 4096,
//! the transfer is 5000 bytes) and, per §4.6, emits a FIN the moment that
//! one `send` call finishes — so the server's `receive` loop must drain
//! both chunks before it ever observes end-of-stream.

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
fn stream_delivers_all_bytes_then_eof_on_fin() {
    let mesh = FakeMesh::new();
    let server_addr = NetworkAddress::new(1);
    let client_addr = NetworkAddress::new(2);
    mesh.connect(server_addr, client_addr);

    let cfg = SystemConfig::default();
    let route_server = Miniroute::new(Arc::new(mesh.link_for(server_addr, None)), cfg.clone());
    let route_client = Miniroute::new(Arc::new(mesh.link_for(client_addr, None)), cfg);

    let sockets_server = MinisocketSystem::new(route_server, AlarmList::new());
    let sockets_client = MinisocketSystem::new(route_client, AlarmList::new());

    let server = sockets_server.listen(7).expect("server socket on port 7");
    let client = sockets_client.connect_new().expect("client socket assigned");

    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

    let scheduler = fast_scheduler();
    let done = Arc::new(Gate::new(0u32));
    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let saw_eof = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let server_socket = Arc::clone(&server);
    let done_server = Arc::clone(&done);
    let received_server = Arc::clone(&received);
    let eof_server = Arc::clone(&saw_eof);
    scheduler.spawn(move |sched, id| {
        server_socket.accept(&sched, id).expect("accept");

        let mut out = [0u8; 4096];
        loop {
            let n = server_socket.receive(&sched, id, &mut out).expect("receive");
            if n == 0 {
                eof_server.store(true, std::sync::atomic::Ordering::SeqCst);
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
            .connect(&sched, id, server_addr, 7)
            .expect("connect");
        let n = client_socket.send(&sched, id, &send_buf).expect("send");
        assert_eq!(n, send_buf.len());

        let mut g = done_client.lock();
        *g += 1;
        done_client.notify_all();
    });

    let g = done.lock();
    let (g, finished) = done.wait_while_timeout(g, |count| *count == 2, Duration::from_secs(5));
    drop(g);
    assert!(finished, "handshake + stream + EOF did not complete in time");

    assert!(saw_eof.load(std::sync::atomic::Ordering::SeqCst), "server never observed FIN as EOF");
    assert_eq!(*received.lock(), payload, "server must receive all bytes in order before EOF");
}

#[test]
fn close_unblocks_a_waiting_receiver() {
    let mesh = FakeMesh::new();
    let server_addr = NetworkAddress::new(1);
    let client_addr = NetworkAddress::new(2);
    mesh.connect(server_addr, client_addr);

    let cfg = SystemConfig::default();
    let route_server = Miniroute::new(Arc::new(mesh.link_for(server_addr, None)), cfg.clone());
    let route_client = Miniroute::new(Arc::new(mesh.link_for(client_addr, None)), cfg);

    let sockets_server = MinisocketSystem::new(route_server, AlarmList::new());
    let sockets_client = MinisocketSystem::new(route_client, AlarmList::new());

    let server = sockets_server.listen(9).expect("server socket on port 9");
    let client = sockets_client.connect_new().expect("client socket assigned");

    let scheduler = fast_scheduler();
    let established = Arc::new(Gate::new(0u32));
    let done = Arc::new(Gate::new(0u32));
    let receive_result = Arc::new(parking_lot::Mutex::new(None));

    let server_socket = Arc::clone(&server);
    let established_server = Arc::clone(&established);
    let done_server = Arc::clone(&done);
    let result_slot = Arc::clone(&receive_result);
    scheduler.spawn(move |sched, id| {
        server_socket.accept(&sched, id).expect("accept");
        {
            let mut g = established_server.lock();
            *g += 1;
            established_server.notify_all();
        }
        let mut out = [0u8; 16];
        let result = server_socket.receive(&sched, id, &mut out);
        *result_slot.lock() = Some(result.is_err());
        let mut g = done_server.lock();
        *g += 1;
        done_server.notify_all();
    });

    let client_socket = Arc::clone(&client);
    let established_client = Arc::clone(&established);
    let done_client = Arc::clone(&done);
    scheduler.spawn(move |sched, id| {
        client_socket
            .connect(&sched, id, server_addr, 9)
            .expect("connect");
        {
            let mut g = established_client.lock();
            *g += 1;
            established_client.notify_all();
        }
        let mut g = done_client.lock();
        *g += 1;
        done_client.notify_all();
    });

    // Wait for both sides of the handshake before closing the server socket
    // out from under its own not-yet-issued `receive` — this exercises a
    // local shutdown canceling a pending blocking call, not a peer-driven
    // FIN (covered by `stream_delivers_all_bytes_then_eof_on_fin` above).
    let g = established.lock();
    let (g, shook_hands) = established.wait_while_timeout(g, |count| *count == 2, Duration::from_secs(5));
    drop(g);
    assert!(shook_hands, "handshake did not complete in time");

    server.close();

    let g = done.lock();
    let (g, finished) = done.wait_while_timeout(g, |count| *count == 2, Duration::from_secs(5));
    drop(g);
    assert!(finished, "close should unblock the waiting receiver");
    assert_eq!(*receive_result.lock(), Some(true), "receive on a closed socket must surface an error");
}
