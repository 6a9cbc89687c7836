//! Minisocket: reliable byte-stream transport over miniroute (§4.6).
//!
//! Grounded in the teacher's `net/tcp.rs` handshake state machine, but
//! driven by the scheduler's cooperative `Semaphore`/`AlarmList` primitives
//! (§4.2, §4.3) instead of epoll — a blocking call here really does park
//! the calling scheduler thread, the way `p()` does in the original.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, trace};

use mthreads_abi::net::{
    retransmit_delay_ms, CLIENT_SOCKET_MAX, CLIENT_SOCKET_MIN, MinisocketMessageType,
    RETRANSMIT_MAX_ATTEMPTS, SERVER_SOCKET_MAX, SERVER_SOCKET_MIN,
};
use mthreads_abi::task::ThreadId;
use mthreads_abi::NetworkAddress;
use mthreads_lib::sync::Gate;
use mthreads_sched::{AlarmList, Scheduler, Semaphore};

use crate::error::NetError;
use crate::route::Miniroute;
use crate::wire::ReliableHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    AwaitSyn,
    AwaitSynAck,
    Established,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct ControlArrival {
    kind: MinisocketMessageType,
    seq: u32,
    ack: u32,
}

struct SocketState {
    role: Role,
    conn: ConnState,
    remote_addr: Option<NetworkAddress>,
    remote_port: Option<u16>,
    next_seq: u32,
    ack_number: u32,
    control_arrivals: VecDeque<ControlArrival>,
    data_arrivals: VecDeque<(u32, Vec<u8>)>,
    terminate: bool,
    blocked_threads: u32,
}

/// One reliable-stream endpoint. Fields mirror §3's "Minisocket" type.
pub struct Socket {
    miniroute: Arc<Miniroute>,
    alarms: Arc<AlarmList>,
    local_port: u16,
    state: Gate<SocketState>,
    arrivals: Arc<Semaphore>,
    system: Weak<MinisocketSystem>,
}

impl Socket {
    /// `P` the arrival semaphore, counting this thread as blocked for as
    /// long as the call takes — `close()` needs an accurate count to know
    /// how many times to `V` when it wakes everyone up.
    fn block_on_arrival(&self, scheduler: &Arc<Scheduler>, thread_id: ThreadId) {
        self.state.lock().blocked_threads += 1;
        self.arrivals.p(scheduler, thread_id);
        self.state.lock().blocked_threads -= 1;
    }

    fn send_segment(&self, message_type: MinisocketMessageType, seq: u32, ack: u32, payload: &[u8]) {
        let (remote_addr, remote_port) = {
            let guard = self.state.lock();
            (guard.remote_addr, guard.remote_port)
        };
        let (Some(remote_addr), Some(remote_port)) = (remote_addr, remote_port) else {
            return;
        };
        let header = ReliableHeader {
            message_type,
            source_port: self.local_port,
            dest_port: remote_port,
            seq_number: seq,
            ack_number: ack,
        };
        let mut frame = Vec::with_capacity(ReliableHeader::WIRE_LEN + payload.len());
        header.encode(&mut frame);
        frame.extend_from_slice(payload);
        let _ = self.miniroute.send_data(remote_addr, &frame);
    }

    /// Transmit with exponential-backoff retransmit (§4.6), retrying until
    /// `accept` matches the arrival at the front of the control queue or
    /// attempts are exhausted.
    fn send_with_retransmit(
        &self,
        scheduler: &Arc<Scheduler>,
        thread_id: ThreadId,
        message_type: MinisocketMessageType,
        seq: u32,
        ack: u32,
        payload: &[u8],
        accept: impl Fn(&ControlArrival) -> bool,
    ) -> Result<ControlArrival, NetError> {
        for attempt in 0..RETRANSMIT_MAX_ATTEMPTS {
            self.send_segment(message_type, seq, ack, payload);

            let delay = Duration::from_millis(retransmit_delay_ms(attempt));
            let wakeup = Arc::clone(&self.arrivals);
            let alarm_id = self.alarms.register(delay, move || wakeup.v());

            self.block_on_arrival(scheduler, thread_id);
            self.alarms.deregister(alarm_id);

            let arrival = { self.state.lock().control_arrivals.pop_front() };
            if let Some(arrival) = arrival {
                if accept(&arrival) {
                    return Ok(arrival);
                }
                trace!(kind = ?arrival.kind, "retransmit wake: arrival did not match expectation");
            }
        }
        Err(NetError::ConnectionReset)
    }

    /// Server-side: block until a SYN arrives, handshake to ESTABLISHED.
    pub fn accept(&self, scheduler: &Arc<Scheduler>, thread_id: ThreadId) -> Result<(), NetError> {
        loop {
            self.block_on_arrival(scheduler, thread_id);
            let syn = {
                let mut guard = self.state.lock();
                let pos = guard
                    .control_arrivals
                    .iter()
                    .position(|a| a.kind == MinisocketMessageType::Syn);
                pos.map(|idx| guard.control_arrivals.remove(idx).unwrap())
            };
            if let Some(syn) = syn {
                let mut guard = self.state.lock();
                guard.ack_number = syn.seq;
                break;
            }
        }

        let my_seq = { self.state.lock().next_seq };
        let ack_number = { self.state.lock().ack_number };
        self.send_with_retransmit(
            scheduler,
            thread_id,
            MinisocketMessageType::SynAck,
            my_seq,
            ack_number,
            &[],
            |a| a.kind == MinisocketMessageType::Ack && a.ack == my_seq,
        )?;

        let mut guard = self.state.lock();
        guard.conn = ConnState::Established;
        debug!(local_port = self.local_port, "minisocket established (server)");
        Ok(())
    }

    /// Client-side: SYN, await SYNACK, ACK, ESTABLISHED.
    pub fn connect(
        &self,
        scheduler: &Arc<Scheduler>,
        thread_id: ThreadId,
        remote_addr: NetworkAddress,
        remote_port: u16,
    ) -> Result<(), NetError> {
        {
            let mut guard = self.state.lock();
            guard.remote_addr = Some(remote_addr);
            guard.remote_port = Some(remote_port);
        }

        let my_seq = 0;
        let synack = self.send_with_retransmit(
            scheduler,
            thread_id,
            MinisocketMessageType::Syn,
            my_seq,
            0,
            &[],
            |a| a.kind == MinisocketMessageType::SynAck && a.ack == my_seq,
        )?;

        {
            let mut guard = self.state.lock();
            guard.ack_number = synack.seq;
            guard.next_seq = my_seq + 1;
            guard.conn = ConnState::Established;
        }
        self.send_segment(MinisocketMessageType::Ack, my_seq + 1, synack.seq, &[]);
        debug!(local_port = self.local_port, "minisocket established (client)");
        Ok(())
    }

    /// Partition `buf` into chunks, sending each with retransmit, then emit
    /// a FIN (§4.6: FIN is per-`send()`-call, not per socket lifetime —
    /// this reproduces the original's behavior, including the defect that
    /// a FIN terminates every call rather than only the stream's last one).
    pub fn send(
        &self,
        scheduler: &Arc<Scheduler>,
        thread_id: ThreadId,
        buf: &[u8],
    ) -> Result<usize, NetError> {
        use mthreads_abi::net::MINIMSG_MAX_MSG_SIZE;

        let mut sent = 0;
        for chunk in buf.chunks(MINIMSG_MAX_MSG_SIZE) {
            let seq = {
                let mut guard = self.state.lock();
                let seq = guard.next_seq;
                guard.next_seq += 1;
                seq
            };
            let ack = { self.state.lock().ack_number };
            self.send_with_retransmit(
                scheduler,
                thread_id,
                MinisocketMessageType::Data,
                seq,
                ack,
                chunk,
                |a| a.kind == MinisocketMessageType::Ack && a.ack == seq,
            )?;
            sent += chunk.len();
        }
        let ack = { self.state.lock().ack_number };
        self.send_segment(MinisocketMessageType::Fin, 0, ack, &[]);
        Ok(sent)
    }

    /// Block for the next chunk of stream data; `Ok(0)` signals EOF (FIN).
    pub fn receive(
        &self,
        scheduler: &Arc<Scheduler>,
        thread_id: ThreadId,
        out: &mut [u8],
    ) -> Result<usize, NetError> {
        loop {
            self.block_on_arrival(scheduler, thread_id);

            if { self.state.lock().terminate } {
                return Err(NetError::ConnectionClosed);
            }

            let fin = {
                let mut guard = self.state.lock();
                let pos = guard
                    .control_arrivals
                    .iter()
                    .position(|a| a.kind == MinisocketMessageType::Fin);
                pos.map(|idx| guard.control_arrivals.remove(idx))
            }
            .is_some();
            if fin {
                self.state.lock().conn = ConnState::Closing;
                return Ok(0);
            }

            let data = { self.state.lock().data_arrivals.pop_front() };
            let Some((seq, payload)) = data else {
                continue;
            };

            let mut guard = self.state.lock();
            if seq == guard.ack_number + 1 {
                guard.ack_number = seq;
                let ack = guard.ack_number;
                drop(guard);
                self.send_segment(MinisocketMessageType::Ack, 0, ack, &[]);
                let n = payload.len().min(out.len());
                out[..n].copy_from_slice(&payload[..n]);
                return Ok(n);
            } else if seq <= guard.ack_number {
                // Duplicate: re-acknowledge, don't redeliver.
                let ack = guard.ack_number;
                drop(guard);
                self.send_segment(MinisocketMessageType::Ack, 0, ack, &[]);
            }
            // else: out-of-order, drop silently and loop (retransmit will resend).
        }
    }

    /// Record an inbound segment addressed to this socket. Called from the
    /// miniroute dispatch path, never by application code directly.
    fn on_segment(&self, source: NetworkAddress, header: ReliableHeader, payload: &[u8]) {
        let mut guard = self.state.lock();
        if guard.remote_addr.is_none() {
            guard.remote_addr = Some(source);
            guard.remote_port = Some(header.source_port);
        }
        match header.message_type {
            MinisocketMessageType::Data => {
                guard
                    .data_arrivals
                    .push_back((header.seq_number, payload.to_vec()));
            }
            _ => guard.control_arrivals.push_back(ControlArrival {
                kind: header.message_type,
                seq: header.seq_number,
                ack: header.ack_number,
            }),
        }
        drop(guard);
        self.arrivals.v();
    }

    /// Tear down the connection: wake every blocked caller and mark
    /// terminated, then free this port's table slot. Close must never fail
    /// (§4.6).
    pub fn close(&self) {
        let mut guard = self.state.lock();
        guard.terminate = true;
        guard.conn = ConnState::Closed;
        let waiters = guard.blocked_threads;
        drop(guard);
        for _ in 0..waiters {
            self.arrivals.v();
        }
        if let Some(system) = self.system.upgrade() {
            system.release(self.local_port);
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }
}

/// Owns the process-wide minisocket table, one shared table per node.
pub struct MinisocketSystem {
    miniroute: Arc<Miniroute>,
    alarms: Arc<AlarmList>,
    table: parking_lot::Mutex<HashMap<u16, Arc<Socket>>>,
    next_client_port: AtomicU16,
}

impl MinisocketSystem {
    pub fn new(miniroute: Arc<Miniroute>, alarms: Arc<AlarmList>) -> Arc<Self> {
        let system = Arc::new(Self {
            miniroute: Arc::clone(&miniroute),
            alarms,
            table: parking_lot::Mutex::new(HashMap::new()),
            next_client_port: AtomicU16::new(CLIENT_SOCKET_MIN),
        });

        let dispatch = Arc::clone(&system);
        miniroute.set_stream_handler(Box::new(move |source, payload| {
            dispatch.on_frame(source, payload);
        }));
        system
    }

    fn on_frame(&self, source: NetworkAddress, payload: &[u8]) {
        let (header, body) = match ReliableHeader::decode(payload) {
            Ok(v) => v,
            Err(_) => return,
        };
        let socket = self.table.lock().get(&header.dest_port).cloned();
        if let Some(socket) = socket {
            socket.on_segment(source, header, body);
        }
    }

    fn new_socket(self: &Arc<Self>, local_port: u16, role: Role) -> Arc<Socket> {
        Arc::new(Socket {
            miniroute: Arc::clone(&self.miniroute),
            alarms: Arc::clone(&self.alarms),
            local_port,
            system: Arc::downgrade(self),
            state: Gate::new(SocketState {
                role,
                conn: if role == Role::Server {
                    ConnState::AwaitSyn
                } else {
                    ConnState::AwaitSynAck
                },
                remote_addr: None,
                remote_port: None,
                next_seq: 0,
                ack_number: 0,
                control_arrivals: VecDeque::new(),
                data_arrivals: VecDeque::new(),
                terminate: false,
                blocked_threads: 0,
            }),
            arrivals: Arc::new(Semaphore::new(0)),
        })
    }

    /// Open a server socket on `port` (0..32767, exactly one at a time).
    pub fn listen(self: &Arc<Self>, port: u16) -> Result<Arc<Socket>, NetError> {
        if !(SERVER_SOCKET_MIN..=SERVER_SOCKET_MAX).contains(&port) {
            return Err(NetError::UnknownPort(port));
        }
        let mut table = self.table.lock();
        if table.contains_key(&port) {
            return Err(NetError::PortInUse);
        }
        let socket = self.new_socket(port, Role::Server);
        table.insert(port, Arc::clone(&socket));
        Ok(socket)
    }

    /// Open a client socket on a freshly assigned port in 32768..65535.
    pub fn connect_new(self: &Arc<Self>) -> Result<Arc<Socket>, NetError> {
        let start = self.next_client_port.load(Ordering::Relaxed);
        let mut candidate = start;
        let mut table = self.table.lock();
        loop {
            if !table.contains_key(&candidate) {
                let socket = self.new_socket(candidate, Role::Client);
                table.insert(candidate, Arc::clone(&socket));
                self.next_client_port.store(
                    if candidate == CLIENT_SOCKET_MAX {
                        CLIENT_SOCKET_MIN
                    } else {
                        candidate + 1
                    },
                    Ordering::Relaxed,
                );
                return Ok(socket);
            }
            candidate = if candidate == CLIENT_SOCKET_MAX {
                CLIENT_SOCKET_MIN
            } else {
                candidate + 1
            };
            if candidate == start {
                return Err(NetError::NoMorePorts);
            }
        }
    }

    /// Release `port`'s table slot, freeing it for a future `listen()` or
    /// `connect_new()`. Called by [`Socket::close`] directly.
    pub fn release(&self, port: u16) {
        self.table.lock().remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::FakeMesh;
    use mthreads_abi::config::SystemConfig;

    fn fast_scheduler() -> Arc<Scheduler> {
        let mut cfg = SystemConfig::default();
        cfg.tick_period = Duration::from_millis(2);
        Scheduler::new(cfg)
    }

    #[test]
    fn handshake_establishes_connection_and_streams_data() {
        let mesh = FakeMesh::new();
        let a = NetworkAddress::new(1);
        let b = NetworkAddress::new(2);
        mesh.connect(a, b);

        let cfg = SystemConfig::default();
        let route_a = Miniroute::new(Arc::new(mesh.link_for(a, None)), cfg.clone());
        let route_b = Miniroute::new(Arc::new(mesh.link_for(b, None)), cfg);

        let sockets_a = MinisocketSystem::new(route_a, AlarmList::new());
        let sockets_b = MinisocketSystem::new(route_b, AlarmList::new());

        let server = sockets_b.listen(500).unwrap();
        let client = sockets_a.connect_new().unwrap();

        let scheduler = fast_scheduler();
        let done = Arc::new(Gate::new(0u32));

        let server_for_thread = Arc::clone(&server);
        let done_server = Arc::clone(&done);
        scheduler.spawn(move |sched, id| {
            server_for_thread.accept(&sched, id).expect("accept");
            let mut out = [0u8; 64];
            let n = server_for_thread.receive(&sched, id, &mut out).expect("receive");
            assert_eq!(&out[..n], b"hello-stream");
            let mut g = done_server.lock();
            *g += 1;
            done_server.notify_all();
        });

        let client_for_thread = Arc::clone(&client);
        let done_client = Arc::clone(&done);
        scheduler.spawn(move |sched, id| {
            client_for_thread
                .connect(&sched, id, b, 500)
                .expect("connect");
            client_for_thread
                .send(&sched, id, b"hello-stream")
                .expect("send");
            let mut g = done_client.lock();
            *g += 1;
            done_client.notify_all();
        });

        let g = done.lock();
        let (g, finished) = done.wait_while_timeout(g, |count| *count == 2, Duration::from_secs(5));
        drop(g);
        assert!(finished, "handshake + stream did not complete in time");
    }

    #[test]
    fn server_port_cannot_be_double_bound() {
        let mesh = FakeMesh::new();
        let a = NetworkAddress::new(1);
        let route_a = Miniroute::new(Arc::new(mesh.link_for(a, None)), SystemConfig::default());
        let sockets_a = MinisocketSystem::new(route_a, AlarmList::new());
        let _first = sockets_a.listen(10).unwrap();
        assert!(matches!(sockets_a.listen(10), Err(NetError::PortInUse)));
    }

    #[test]
    fn close_releases_port_for_reuse() {
        let mesh = FakeMesh::new();
        let a = NetworkAddress::new(1);
        let route_a = Miniroute::new(Arc::new(mesh.link_for(a, None)), SystemConfig::default());
        let sockets_a = MinisocketSystem::new(route_a, AlarmList::new());
        let first = sockets_a.listen(11).unwrap();
        first.close();
        let _second = sockets_a.listen(11).expect("port freed after close");
    }

    #[test]
    fn close_wakes_every_blocked_receiver() {
        let mesh = FakeMesh::new();
        let a = NetworkAddress::new(1);
        let route_a = Miniroute::new(Arc::new(mesh.link_for(a, None)), SystemConfig::default());
        let sockets_a = MinisocketSystem::new(route_a, AlarmList::new());
        let server = sockets_a.listen(12).unwrap();

        let scheduler = fast_scheduler();
        let done = Arc::new(Gate::new(0u32));

        for _ in 0..2 {
            let server = Arc::clone(&server);
            let done = Arc::clone(&done);
            scheduler.spawn(move |sched, id| {
                let mut out = [0u8; 8];
                let result = server.receive(&sched, id, &mut out);
                assert!(matches!(result, Err(NetError::ConnectionClosed)));
                let mut g = done.lock();
                *g += 1;
                done.notify_all();
            });
        }

        // Give both receivers time to park on the arrival semaphore before
        // closing — this is what close() needs to count correctly.
        std::thread::sleep(Duration::from_millis(20));
        server.close();

        let g = done.lock();
        let (g, finished) = done.wait_while_timeout(g, |count| *count == 2, Duration::from_secs(2));
        drop(g);
        assert!(finished, "close should wake every blocked receiver, not just one");
    }
}
