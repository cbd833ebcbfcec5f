//! The cluster façade: peer resolution for other services.

use std::sync::{Arc, RwLock};

use corral_claims::{ClaimError, ClaimRegistry};
use corral_types::{EntityIds, Role};
use rand::seq::IndexedRandom;
use tonic::transport::Channel;
use tracing::debug;

use crate::error::ClusterError;
use crate::peer::Peer;
use crate::snapshot::Snapshot;

/// Shared, read-mostly view of the cluster with peer resolution on top.
///
/// The discovery engine is the only writer: it swaps in a freshly built
/// [`Snapshot`] after every pass. Readers clone the snapshot `Arc` under
/// a short read lock and never hold the lock across I/O.
pub struct Cluster {
    snapshot: RwLock<Arc<Snapshot>>,
    /// Claim registry consulted for entity-owning (gateway server) lookups.
    claims: Option<Arc<dyn ClaimRegistry>>,
}

impl Cluster {
    /// Create a cluster view without claim-registry integration.
    ///
    /// Gateway-server lookups with identifiers fall back to consistent
    /// hashing, like any other role.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot: RwLock::new(Snapshot::empty()),
            claims: None,
        })
    }

    /// Create a cluster view that resolves gateway-server ownership
    /// through the given claim registry.
    pub fn with_claims(claims: Arc<dyn ClaimRegistry>) -> Arc<Self> {
        Arc::new(Self {
            snapshot: RwLock::new(Snapshot::empty()),
            claims: Some(claims),
        })
    }

    /// The current snapshot.
    pub(crate) fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    /// Replace the snapshot wholesale. Discovery is the only caller.
    pub(crate) fn swap(&self, snapshot: Arc<Snapshot>) {
        *self.snapshot.write().expect("snapshot lock poisoned") = snapshot;
    }

    /// All current peers for a role, sorted by name. Empty if none.
    pub fn get_peers(&self, role: Role) -> Vec<Arc<Peer>> {
        let role = routed_role(role, None);
        self.snapshot()
            .by_role
            .get(&role)
            .cloned()
            .unwrap_or_default()
    }

    /// The peer responsible for `role`, optionally for a specific entity.
    ///
    /// Without identifiers, picks uniformly at random among the role's
    /// peers. With identifiers, gateway-server lookups consult the claim
    /// registry for the owning peer (falling back to the hash ring when
    /// nothing is claimed); every other role hashes the identifiers onto
    /// the role's ring.
    pub async fn get_peer(
        &self,
        role: Role,
        ids: Option<&EntityIds>,
    ) -> Result<Arc<Peer>, ClusterError> {
        let role = routed_role(role, ids);
        let snapshot = self.snapshot();

        let Some(ids) = ids else {
            return snapshot
                .by_role
                .get(&role)
                .and_then(|peers| peers.choose(&mut rand::rng()).cloned())
                .ok_or(ClusterError::PeerUnavailable { role });
        };

        if role == Role::GatewayServer {
            let peers = snapshot
                .by_role
                .get(&role)
                .filter(|peers| !peers.is_empty())
                .ok_or(ClusterError::PeerUnavailable { role })?;

            // A single peer owns everything; no lookup needed.
            if peers.len() == 1 {
                return Ok(peers[0].clone());
            }

            if let Some(claims) = &self.claims {
                let candidates: Vec<String> =
                    peers.iter().map(|p| p.name().to_string()).collect();
                match claims.get_peer_id(ids, &candidates).await {
                    Ok(owner) => {
                        // The owner may have dropped out of the snapshot
                        // between the claim check and now; fall through to
                        // the ring if so.
                        if let Some(peer) = snapshot.peers.get(&owner) {
                            return Ok(peer.clone());
                        }
                        debug!(%owner, "claimed peer no longer in snapshot");
                    }
                    Err(ClaimError::PeerUnavailable { .. }) => {
                        debug!(entity = %ids.routing_key(), "entity is unclaimed");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Deterministic sharding over the role's ring.
        let name = snapshot
            .rings
            .get(&role)
            .and_then(|ring| ring.get(&ids.routing_key()))
            .ok_or(ClusterError::PeerUnavailable { role })?;
        snapshot
            .peers
            .get(name)
            .cloned()
            .ok_or(ClusterError::PeerUnavailable { role })
    }

    /// [`Cluster::get_peer`] plus the peer's connection.
    pub async fn get_peer_conn(
        &self,
        role: Role,
        ids: Option<&EntityIds>,
    ) -> Result<Channel, ClusterError> {
        self.get_peer(role, ids).await?.conn()
    }
}

/// Remap a requested role before resolution.
///
/// Access endpoints are served by the entity registry process, so access
/// lookups resolve through entity-registry peers. Pure function, applied
/// before any snapshot read.
fn routed_role(role: Role, _ids: Option<&EntityIds>) -> Role {
    match role {
        Role::Access => Role::EntityRegistry,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_routes_through_entity_registry() {
        assert_eq!(routed_role(Role::Access, None), Role::EntityRegistry);
        assert_eq!(routed_role(Role::GatewayServer, None), Role::GatewayServer);
    }
}
