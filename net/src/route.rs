//! Miniroute: source-routed discovery, forwarding, and route caching
//! (§4.5).
//!
//! Grounded in the teacher's `net/route.rs` routing table, but where that
//! table is populated by DHCP/static config, ours is populated by flooding
//! a Discovery broadcast and caching the path a Reply traces back along.
//!
//! # Path representation
//!
//! A route's `path` is the ordered list of intermediate hops between this
//! node and the destination — *excluding both endpoints*. Data packets
//! shrink their header's path by one hop per forward (the classic
//! source-route consumption); Discovery/Reply packets instead grow/carry
//! the full path so the original requester ends up with the complete
//! route to cache, not whatever's left after the last hop forwarded it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use mthreads_abi::config::SystemConfig;
use mthreads_abi::net::{InnerProtocol, MinirouteType, MAX_ROUTE_LENGTH};
use mthreads_abi::NetworkAddress;

use crate::error::NetError;
use crate::link::Link;
use crate::wire::MinirouteHeader;

type DataHandler = Box<dyn Fn(NetworkAddress, &[u8]) + Send + Sync>;

enum CacheEntry {
    Discovering { attempt_id: u32, waiters: u32 },
    Known { path: Vec<NetworkAddress> },
}

/// Find `me`'s position in an (unshrunk) Reply path and return whichever
/// hop comes next, falling back to `destination` once there's nothing
/// left — used both by the replying node itself (not present in `path`)
/// and by every hop forwarding the reply onward.
fn next_hop_on_path(
    path: &[NetworkAddress],
    me: NetworkAddress,
    destination: NetworkAddress,
) -> NetworkAddress {
    match path.iter().position(|hop| *hop == me) {
        Some(idx) => path.get(idx + 1).copied().unwrap_or(destination),
        None => path.first().copied().unwrap_or(destination),
    }
}

struct Inner {
    cache: HashMap<NetworkAddress, CacheEntry>,
}

/// Miniroute layer: one instance per node, wired to a [`Link`] and to the
/// protocol handlers above it (miniport, minisocket).
pub struct Miniroute {
    link: Arc<dyn Link>,
    config: SystemConfig,
    state: mthreads_lib::sync::Gate<Inner>,
    next_discovery_id: AtomicU32,
    datagram_handler: parking_lot::Mutex<Option<DataHandler>>,
    stream_handler: parking_lot::Mutex<Option<DataHandler>>,
}

impl Miniroute {
    pub fn new(link: Arc<dyn Link>, config: SystemConfig) -> Arc<Self> {
        let miniroute = Arc::new(Self {
            link: Arc::clone(&link),
            config,
            state: mthreads_lib::sync::Gate::new(Inner {
                cache: HashMap::new(),
            }),
            next_discovery_id: AtomicU32::new(1),
            datagram_handler: parking_lot::Mutex::new(None),
            stream_handler: parking_lot::Mutex::new(None),
        });

        let dispatcher = Arc::clone(&miniroute);
        link.set_receive_callback(Box::new(move |_from, frame| {
            dispatcher.on_frame_received(&frame);
        }));
        miniroute
    }

    pub fn local_address(&self) -> NetworkAddress {
        self.link.local_address()
    }

    /// Register the handler invoked for inbound Data packets whose inner
    /// protocol is a miniport datagram.
    pub fn set_datagram_handler(&self, handler: DataHandler) {
        *self.datagram_handler.lock() = Some(handler);
    }

    /// Register the handler invoked for inbound Data packets whose inner
    /// protocol is a minisocket reliable-stream segment.
    pub fn set_stream_handler(&self, handler: DataHandler) {
        *self.stream_handler.lock() = Some(handler);
    }

    /// Send `payload` (an already-encoded datagram or reliable-stream
    /// segment) to `dest`, discovering a route first if none is cached.
    /// A loopback send (`dest == local_address()`) is dispatched in-process
    /// without touching the link at all — no discovery is needed to find
    /// ourselves.
    pub fn send_data(&self, dest: NetworkAddress, payload: &[u8]) -> Result<(), NetError> {
        if dest == self.local_address() {
            self.dispatch_inbound(self.local_address(), payload);
            return Ok(());
        }
        let path = self.resolve(dest)?;
        self.emit(dest, path, payload)
    }

    /// Emit a Data packet, shrinking `path` by one hop as it's handed off —
    /// each forwarder along the way does the same, so the header always
    /// carries exactly the hops still ahead of it.
    fn emit(
        &self,
        destination: NetworkAddress,
        mut path: Vec<NetworkAddress>,
        payload: &[u8],
    ) -> Result<(), NetError> {
        let next_hop = if path.is_empty() {
            destination
        } else {
            path.remove(0)
        };
        let header = MinirouteHeader {
            packet_type: MinirouteType::Data,
            ttl: MAX_ROUTE_LENGTH as u8,
            discovery_id: 0,
            destination,
            source: self.local_address(),
            path,
        };
        let mut frame = Vec::new();
        header.encode(&mut frame);
        frame.extend_from_slice(payload);
        self.link.send(next_hop, &frame).map_err(|_| NetError::LinkError)
    }

    /// Emit a Reply, whose `path` must survive intact all the way to the
    /// requester to be cached — forwarders pick their next hop by finding
    /// their own position in the (unshrunk) path instead of consuming it.
    fn emit_reply(&self, destination: NetworkAddress, discovery_id: u32, path: Vec<NetworkAddress>) {
        let me = self.local_address();
        let next_hop = next_hop_on_path(&path, me, destination);
        let header = MinirouteHeader {
            packet_type: MinirouteType::Reply,
            ttl: MAX_ROUTE_LENGTH as u8,
            discovery_id,
            destination,
            source: me,
            path,
        };
        let mut frame = Vec::new();
        header.encode(&mut frame);
        let _ = self.link.send(next_hop, &frame);
    }

    /// If `dest` already has a discovery in flight (started by another
    /// caller), join it instead of flooding a redundant broadcast (§4.5
    /// step 2): bump its waiter count and block on the same cache-update
    /// condition the original caller's attempt loop already notifies on.
    /// Returns `Ok(Some(path))` if it resolves while we wait, `Ok(None)` if
    /// there was nothing to join (or it gave up and the caller should drive
    /// its own attempt), or `Err` if we timed out still waiting.
    fn join_existing_discovery(
        &self,
        dest: NetworkAddress,
    ) -> Result<Option<Vec<NetworkAddress>>, NetError> {
        let mut guard = self.state.lock();
        match guard.cache.get(&dest) {
            Some(CacheEntry::Known { path }) => return Ok(Some(path.clone())),
            Some(CacheEntry::Discovering { .. }) => {}
            None => return Ok(None),
        }
        if let Some(CacheEntry::Discovering { waiters, .. }) = guard.cache.get_mut(&dest) {
            *waiters += 1;
            trace!(%dest, waiters = *waiters, "joining an in-flight discovery");
        }

        let (guard, woke) = self.state.wait_while_timeout(
            guard,
            |inner| !matches!(inner.cache.get(&dest), Some(CacheEntry::Discovering { .. })),
            self.config.discovery_timeout,
        );
        let result = match guard.cache.get(&dest) {
            Some(CacheEntry::Known { path }) => Ok(Some(path.clone())),
            _ if woke => Ok(None),
            _ => Err(NetError::DiscoveryTimedOut(dest)),
        };
        drop(guard);
        result
    }

    /// Resolve `dest` to a hop path, flooding Discovery broadcasts and
    /// retrying up to `config.discovery_max_attempts` times.
    fn resolve(&self, dest: NetworkAddress) -> Result<Vec<NetworkAddress>, NetError> {
        if let Some(path) = self.join_existing_discovery(dest)? {
            return Ok(path);
        }

        for attempt in 0..self.config.discovery_max_attempts {
            let id = self.next_discovery_id.fetch_add(1, Ordering::Relaxed);
            {
                let mut guard = self.state.lock();
                guard
                    .cache
                    .insert(dest, CacheEntry::Discovering { attempt_id: id, waiters: 0 });
            }

            debug!(%dest, attempt, discovery_id = id, "broadcasting route discovery");
            let header = MinirouteHeader {
                packet_type: MinirouteType::Discovery,
                ttl: MAX_ROUTE_LENGTH as u8,
                discovery_id: id,
                destination: dest,
                source: self.local_address(),
                path: Vec::new(),
            };
            let mut frame = Vec::new();
            header.encode(&mut frame);
            let _ = self.link.broadcast(&frame);

            let guard = self.state.lock();
            let (guard, found) = self.state.wait_while_timeout(
                guard,
                |inner| matches!(inner.cache.get(&dest), Some(CacheEntry::Known { .. })),
                self.config.discovery_timeout,
            );
            let path = if found {
                match guard.cache.get(&dest) {
                    Some(CacheEntry::Known { path }) => Some(path.clone()),
                    _ => None,
                }
            } else {
                None
            };
            drop(guard);

            if let Some(path) = path {
                return Ok(path);
            }
        }

        // Every attempt failed: clear the entry so anyone who joined us via
        // `join_existing_discovery` wakes up and is free to drive their own
        // attempt instead of waiting on a discovery nobody is still running.
        {
            let mut guard = self.state.lock();
            guard.cache.remove(&dest);
        }
        self.state.notify_all();
        Err(NetError::DiscoveryTimedOut(dest))
    }

    fn on_frame_received(&self, frame: &[u8]) {
        let (header, payload) = match MinirouteHeader::decode(frame) {
            Ok(v) => v,
            Err(_) => {
                warn!("dropping malformed miniroute frame");
                return;
            }
        };

        match header.packet_type {
            MinirouteType::Discovery => self.handle_discovery(header),
            MinirouteType::Reply => self.handle_reply(header),
            MinirouteType::Data => self.handle_data(header, payload),
        }
    }

    fn handle_discovery(&self, header: MinirouteHeader) {
        let me = self.local_address();
        if header.destination == me {
            trace!(discovery_id = header.discovery_id, "we are the discovery target, replying");
            let reply_path: Vec<NetworkAddress> = header.path.iter().rev().copied().collect();
            self.emit_reply(header.source, header.discovery_id, reply_path);
            return;
        }

        if header.ttl == 0 || header.path.len() >= self.config.max_route_length {
            trace!("dropping discovery: ttl exhausted or path at max length");
            return;
        }
        if header.path.contains(&me) {
            trace!("dropping discovery: loop detected");
            return;
        }

        let mut path = header.path.clone();
        path.push(me);
        let forwarded = MinirouteHeader {
            packet_type: MinirouteType::Discovery,
            ttl: header.ttl - 1,
            discovery_id: header.discovery_id,
            destination: header.destination,
            source: header.source,
            path,
        };
        let mut frame = Vec::new();
        forwarded.encode(&mut frame);
        let _ = self.link.broadcast(&frame);
    }

    fn handle_reply(&self, mut header: MinirouteHeader) {
        let me = self.local_address();
        if header.destination == me {
            let mut guard = self.state.lock();
            let matches_attempt = matches!(
                guard.cache.get(&header.source),
                Some(CacheEntry::Discovering { attempt_id, .. }) if *attempt_id == header.discovery_id
            );
            if !matches_attempt {
                trace!(
                    discovery_id = header.discovery_id,
                    "dropping reply for superseded or unknown discovery"
                );
                return;
            }
            debug!(dest = %header.source, path_len = header.path.len(), "route discovered");
            // `header.path` is in reply-travel order (destination -> us);
            // the cached route needs to be in forward order (us -> destination).
            let forward_path: Vec<NetworkAddress> = header.path.into_iter().rev().collect();
            guard
                .cache
                .insert(header.source, CacheEntry::Known { path: forward_path });
            drop(guard);
            self.state.notify_all();
            return;
        }

        if header.ttl == 0 {
            trace!("dropping reply: ttl exhausted");
            return;
        }
        header.ttl -= 1;

        // Forward the reply toward its destination, using position-in-path
        // lookup rather than shrinking — the path must arrive intact at
        // the requester so it can be cached whole.
        let next_hop = next_hop_on_path(&header.path, me, header.destination);
        let mut frame = Vec::new();
        header.encode(&mut frame);
        let _ = self.link.send(next_hop, &frame);
    }

    fn handle_data(&self, header: MinirouteHeader, payload: &[u8]) {
        let me = self.local_address();
        if header.destination != me {
            if header.ttl == 0 {
                trace!("dropping data packet: ttl exhausted");
                return;
            }
            let mut forwarded = header.clone();
            forwarded.ttl -= 1;
            let next_hop = if forwarded.path.is_empty() {
                forwarded.destination
            } else {
                forwarded.path.remove(0)
            };
            let mut frame = Vec::new();
            forwarded.encode(&mut frame);
            frame.extend_from_slice(payload);
            let _ = self.link.send(next_hop, &frame);
            return;
        }

        self.dispatch_inbound(header.source, payload);
    }

    /// Hand a decoded Data payload to whichever protocol handler owns its
    /// inner-protocol tag. Shared by `handle_data` (payload arrived over the
    /// link) and `send_data`'s loopback fast path (payload never left this
    /// node).
    fn dispatch_inbound(&self, source: NetworkAddress, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        match InnerProtocol::from_u8(payload[0]) {
            Some(InnerProtocol::MiniDatagram) => {
                if let Some(handler) = self.datagram_handler.lock().as_ref() {
                    handler(source, payload);
                }
            }
            Some(InnerProtocol::MiniStream) => {
                if let Some(handler) = self.stream_handler.lock().as_ref() {
                    handler(source, payload);
                }
            }
            None => warn!("dropping data packet with unknown inner protocol"),
        }
    }

    pub fn cached_route(&self, dest: NetworkAddress) -> Option<Vec<NetworkAddress>> {
        match self.state.lock().cache.get(&dest) {
            Some(CacheEntry::Known { path }) => Some(path.clone()),
            _ => None,
        }
    }
}
