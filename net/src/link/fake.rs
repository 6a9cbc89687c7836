//! An in-process [`Link`] implementation for tests: nodes exchange frames
//! through shared Rust data structures instead of real hardware, with an
//! optional deterministic drop pattern standing in for a lossy medium.
//!
//! Grounded in the teacher's `net/loopback.rs` single-node loopback device,
//! generalized here to a multi-node mesh since the miniroute layer needs
//! more than one neighbor to exercise discovery/forwarding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use mthreads_abi::NetworkAddress;

use super::Link;
use crate::error::NetError;

type ReceiveCallback = Box<dyn Fn(NetworkAddress, Vec<u8>) + Send + Sync>;

#[derive(Default)]
struct NodeEntry {
    neighbors: Mutex<Vec<NetworkAddress>>,
    callback: Mutex<Option<ReceiveCallback>>,
}

/// A shared topology of [`FakeLink`]s. Build the mesh first, wire up
/// adjacency with [`FakeMesh::connect`], then hand each node its
/// [`FakeLink`] via [`FakeMesh::link_for`].
pub struct FakeMesh {
    nodes: Mutex<HashMap<NetworkAddress, Arc<NodeEntry>>>,
}

impl FakeMesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(HashMap::new()),
        })
    }

    /// Add an undirected edge between two nodes, creating either side if
    /// it doesn't already exist.
    pub fn connect(self: &Arc<Self>, a: NetworkAddress, b: NetworkAddress) {
        let mut nodes = self.nodes.lock().unwrap();
        let entry_a = Arc::clone(nodes.entry(a).or_insert_with(|| Arc::new(NodeEntry::default())));
        let entry_b = Arc::clone(nodes.entry(b).or_insert_with(|| Arc::new(NodeEntry::default())));
        drop(nodes);

        entry_a.neighbors.lock().unwrap().push(b);
        entry_b.neighbors.lock().unwrap().push(a);
    }

    /// Hand out a [`FakeLink`] for `node`, dropping every `drop_every`th
    /// frame sent from it (`None` for a perfectly reliable link).
    pub fn link_for(self: &Arc<Self>, node: NetworkAddress, drop_every: Option<u32>) -> FakeLink {
        self.nodes
            .lock()
            .unwrap()
            .entry(node)
            .or_insert_with(|| Arc::new(NodeEntry::default()));
        FakeLink {
            mesh: Arc::clone(self),
            node,
            drop_every,
            sent: AtomicU32::new(0),
        }
    }

    fn deliver(&self, to: NetworkAddress, from: NetworkAddress, frame: Vec<u8>) {
        // Clone the entry handle and drop the topology lock before invoking
        // the callback — callbacks routinely call back into the mesh (a
        // miniroute forward re-sends on receive) and would otherwise
        // deadlock re-acquiring `nodes`.
        let entry = self.nodes.lock().unwrap().get(&to).cloned();
        if let Some(entry) = entry {
            let callback = entry.callback.lock().unwrap();
            if let Some(cb) = callback.as_ref() {
                cb(from, frame);
            }
        }
    }

    fn neighbors_of(&self, node: NetworkAddress) -> Vec<NetworkAddress> {
        self.nodes
            .lock()
            .unwrap()
            .get(&node)
            .map(|e| e.neighbors.lock().unwrap().clone())
            .unwrap_or_default()
    }
}

pub struct FakeLink {
    mesh: Arc<FakeMesh>,
    node: NetworkAddress,
    drop_every: Option<u32>,
    sent: AtomicU32,
}

impl FakeLink {
    fn should_drop(&self) -> bool {
        match self.drop_every {
            Some(n) if n > 0 => {
                let count = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
                count % n == 0
            }
            _ => false,
        }
    }
}

impl Link for FakeLink {
    fn local_address(&self) -> NetworkAddress {
        self.node
    }

    fn send(&self, next_hop: NetworkAddress, frame: &[u8]) -> Result<(), NetError> {
        if self.should_drop() {
            return Ok(());
        }
        self.mesh.deliver(next_hop, self.node, frame.to_vec());
        Ok(())
    }

    fn broadcast(&self, frame: &[u8]) -> Result<(), NetError> {
        if self.should_drop() {
            return Ok(());
        }
        for neighbor in self.mesh.neighbors_of(self.node) {
            self.mesh.deliver(neighbor, self.node, frame.to_vec());
        }
        Ok(())
    }

    fn set_receive_callback(&self, callback: ReceiveCallback) {
        let nodes = self.mesh.nodes.lock().unwrap();
        if let Some(entry) = nodes.get(&self.node) {
            *entry.callback.lock().unwrap() = Some(callback);
        }
    }
}
