//! Immutable view of the cluster, rebuilt on every discovery pass.

use std::collections::HashMap;
use std::sync::Arc;

use corral_ring::{HashRing, DEFAULT_POINTS_PER_NAME};
use corral_types::Role;

use crate::peer::Peer;

/// One consistent view of the cluster.
///
/// Snapshots are immutable: discovery builds a fresh one from scratch and
/// swaps it in wholesale, so readers never observe a partially rebuilt
/// peer set or a ring that disagrees with `by_role`.
pub(crate) struct Snapshot {
    /// All known peers, keyed by name.
    pub peers: HashMap<String, Arc<Peer>>,
    /// Peers grouped by each role they advertise, sorted by name.
    pub by_role: HashMap<Role, Vec<Arc<Peer>>>,
    /// One hash ring per role, over exactly the names in `by_role`.
    pub rings: HashMap<Role, HashRing>,
}

impl Snapshot {
    /// An empty snapshot, the state before the first discovery pass.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            peers: HashMap::new(),
            by_role: HashMap::new(),
            rings: HashMap::new(),
        })
    }

    /// Build a snapshot from a reconciled peer set.
    pub fn build(peers: HashMap<String, Arc<Peer>>) -> Arc<Self> {
        let mut by_role: HashMap<Role, Vec<Arc<Peer>>> = HashMap::new();
        for peer in peers.values() {
            for role in peer.roles() {
                by_role.entry(*role).or_default().push(peer.clone());
            }
        }

        let mut rings = HashMap::with_capacity(by_role.len());
        for (role, role_peers) in by_role.iter_mut() {
            role_peers.sort_by(|a, b| a.name().cmp(b.name()));
            rings.insert(
                *role,
                HashRing::new(role_peers.iter().map(|p| p.name()), DEFAULT_POINTS_PER_NAME),
            );
        }

        Arc::new(Self {
            peers,
            by_role,
            rings,
        })
    }
}
