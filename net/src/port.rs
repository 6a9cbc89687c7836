//! Miniport: unreliable datagrams over miniroute (§4.4, §6).
//!
//! Unbound ports (0..32767) are chosen by the caller; bound ports
//! (32768..65535) are assigned by [`MiniportSystem::open_bound`]. Arrival
//! dispatch mirrors the teacher's `UdpDemuxTable`: one inbox per open port,
//! looked up by destination port on every inbound datagram.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tracing::trace;

use mthreads_abi::net::{
    BOUND_PORT_MAX, BOUND_PORT_MIN, MINIMSG_MAX_MSG_SIZE, UNBOUND_PORT_MAX, UNBOUND_PORT_MIN,
};
use mthreads_abi::NetworkAddress;
use mthreads_lib::sync::Gate;

use crate::error::NetError;
use crate::route::Miniroute;
use crate::wire::DatagramHeader;

struct Inbox {
    queue: Gate<VecDeque<(NetworkAddress, u16, Vec<u8>)>>,
}

struct Ports {
    table: parking_lot::Mutex<HashMap<u16, Arc<Inbox>>>,
    next_bound: AtomicU16,
}

/// Owns the port table for one node; hand out [`MiniportSocket`]s via
/// [`open_unbound`](Self::open_unbound) / [`open_bound`](Self::open_bound).
pub struct MiniportSystem {
    miniroute: Arc<Miniroute>,
    ports: Arc<Ports>,
}

impl MiniportSystem {
    pub fn new(miniroute: Arc<Miniroute>) -> Arc<Self> {
        let ports = Arc::new(Ports {
            table: parking_lot::Mutex::new(HashMap::new()),
            next_bound: AtomicU16::new(BOUND_PORT_MIN),
        });
        let system = Arc::new(Self {
            miniroute: Arc::clone(&miniroute),
            ports: Arc::clone(&ports),
        });

        let dispatch_ports = Arc::clone(&ports);
        miniroute.set_datagram_handler(Box::new(move |source, payload| {
            let (header, body) = match DatagramHeader::decode(payload) {
                Ok(v) => v,
                Err(_) => {
                    trace!("dropping malformed datagram");
                    return;
                }
            };
            let inbox = dispatch_ports.table.lock().get(&header.dest_port).cloned();
            match inbox {
                Some(inbox) => {
                    let mut q = inbox.queue.lock();
                    q.push_back((source, header.source_port, body.to_vec()));
                    drop(q);
                    inbox.queue.notify_all();
                }
                None => trace!(port = header.dest_port, "dropping datagram: no listener"),
            }
        }));

        system
    }

    /// Idempotent: a second call for a port that's already open hands back a
    /// handle onto the same inbox rather than failing, so repeated calls
    /// from the same or cooperating threads share one listener until
    /// whichever handle drops last closes it.
    pub fn open_unbound(self: &Arc<Self>, port: u16) -> Result<MiniportSocket, NetError> {
        if !(UNBOUND_PORT_MIN..=UNBOUND_PORT_MAX).contains(&port) {
            return Err(NetError::UnknownPort(port));
        }
        let mut table = self.ports.table.lock();
        table.entry(port).or_insert_with(|| {
            Arc::new(Inbox {
                queue: Gate::new(VecDeque::new()),
            })
        });
        let inbox = table.get(&port).cloned().expect("just inserted above");
        drop(table);
        Ok(MiniportSocket {
            system: Arc::clone(self),
            port,
            inbox,
        })
    }

    pub fn open_bound(self: &Arc<Self>) -> Result<MiniportSocket, NetError> {
        let start = self.ports.next_bound.load(Ordering::Relaxed);
        let mut candidate = start;
        loop {
            if self.register(candidate).is_ok() {
                self.ports.next_bound.store(
                    if candidate == BOUND_PORT_MAX {
                        BOUND_PORT_MIN
                    } else {
                        candidate + 1
                    },
                    Ordering::Relaxed,
                );
                return self.register_handle(candidate);
            }
            candidate = if candidate == BOUND_PORT_MAX {
                BOUND_PORT_MIN
            } else {
                candidate + 1
            };
            if candidate == start {
                return Err(NetError::NoMorePorts);
            }
        }
    }

    fn register(&self, port: u16) -> Result<(), NetError> {
        let mut table = self.ports.table.lock();
        if table.contains_key(&port) {
            return Err(NetError::PortInUse);
        }
        table.insert(
            port,
            Arc::new(Inbox {
                queue: Gate::new(VecDeque::new()),
            }),
        );
        Ok(())
    }

    fn register_handle(self: &Arc<Self>, port: u16) -> Result<MiniportSocket, NetError> {
        let inbox = self
            .ports
            .table
            .lock()
            .get(&port)
            .cloned()
            .ok_or(NetError::UnknownPort(port))?;
        Ok(MiniportSocket {
            system: Arc::clone(self),
            port,
            inbox,
        })
    }
}

/// An open miniport, analogous to a bound UDP socket.
pub struct MiniportSocket {
    system: Arc<MiniportSystem>,
    port: u16,
    inbox: Arc<Inbox>,
}

impl MiniportSocket {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn send(
        &self,
        dest: NetworkAddress,
        dest_port: u16,
        payload: &[u8],
    ) -> Result<(), NetError> {
        if payload.len() > MINIMSG_MAX_MSG_SIZE {
            return Err(NetError::PayloadTooLarge(payload.len(), MINIMSG_MAX_MSG_SIZE));
        }
        let header = DatagramHeader {
            source_port: self.port,
            dest_port,
        };
        let mut frame = Vec::with_capacity(DatagramHeader::WIRE_LEN + payload.len());
        header.encode(&mut frame);
        frame.extend_from_slice(payload);
        self.system.miniroute.send_data(dest, &frame)
    }

    /// Block until a datagram arrives, returning (source address, source
    /// port, payload).
    pub fn receive(&self) -> (NetworkAddress, u16, Vec<u8>) {
        let guard = self.inbox.queue.lock();
        let mut guard = self.inbox.queue.wait_while(guard, |q| !q.is_empty());
        guard.pop_front().expect("queue non-empty after wait")
    }
}

impl Drop for MiniportSocket {
    /// Only the last outstanding handle for this port actually frees the
    /// table slot — the table's own `Arc<Inbox>` plus this handle's is a
    /// strong count of 2 when nobody else shares the port.
    fn drop(&mut self) {
        if Arc::strong_count(&self.inbox) <= 2 {
            self.system.ports.table.lock().remove(&self.port);
        }
    }
}
