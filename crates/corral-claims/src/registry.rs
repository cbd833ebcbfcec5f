//! The claim registry trait and the in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corral_types::{EntityIds, EntityKind};

use crate::error::ClaimError;

/// A distributed record of which peer owns which entity.
///
/// Implementations must be `Send + Sync`; they are shared as
/// `Arc<dyn ClaimRegistry>` between the cluster façade, the services
/// that pin entities, and the keep-alive loop.
#[async_trait::async_trait]
pub trait ClaimRegistry: Send + Sync {
    /// Register this peer's ownership of the entity.
    ///
    /// Gateways with an EUI are additionally indexed by EUI, so lookups
    /// for traffic addressed by EUI resolve without knowing the ID.
    async fn claim(&self, ids: &EntityIds) -> Result<(), ClaimError>;

    /// Remove this peer's ownership of the entity.
    async fn unclaim(&self, ids: &EntityIds) -> Result<(), ClaimError>;

    /// Resolve which of the candidate peers owns the entity.
    ///
    /// Checks candidates in caller-supplied order and returns the first
    /// one holding the claim (EUI-indexed check preferred when the ids
    /// carry an EUI). Fails with [`ClaimError::PeerUnavailable`] when
    /// none do.
    async fn get_peer_id(
        &self,
        ids: &EntityIds,
        candidates: &[String],
    ) -> Result<String, ClaimError>;

    /// Extend the expiry of this peer's claim keys. Driven by the
    /// keep-alive loop; a no-op for stores without expiry.
    async fn refresh_active(&self, ttl: Duration) -> Result<(), ClaimError>;

    /// Delete this peer's claim keys. Driven by the keep-alive loop on
    /// shutdown, so a stopped peer's claims don't linger until their TTL.
    async fn shutdown_cleanup(&self) -> Result<(), ClaimError>;
}

/// Storage key for a peer's per-kind claim set.
pub(crate) fn id_key(peer_id: &str, kind: EntityKind) -> String {
    format!("corral:claims:{peer_id}:{kind}")
}

/// Storage key for a peer's EUI-indexed gateway claim set.
pub(crate) fn eui_key(peer_id: &str) -> String {
    format!("corral:claims:{peer_id}:gateway-eui")
}

/// Shared backing map for [`MemoryClaimRegistry`] instances.
///
/// Clones share the same underlying sets, so several registries (one per
/// simulated peer) observe each other's claims the way Redis-backed
/// peers do.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sets: Arc<Mutex<HashMap<String, HashSet<String>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, entries: &[(String, String)]) {
        let mut sets = self.sets.lock().expect("claim store lock poisoned");
        for (key, member) in entries {
            sets.entry(key.clone()).or_default().insert(member.clone());
        }
    }

    fn remove(&self, entries: &[(String, String)]) {
        let mut sets = self.sets.lock().expect("claim store lock poisoned");
        for (key, member) in entries {
            if let Some(set) = sets.get_mut(key) {
                set.remove(member);
            }
        }
    }

    fn contains(&self, key: &str, member: &str) -> bool {
        self.sets
            .lock()
            .expect("claim store lock poisoned")
            .get(key)
            .is_some_and(|set| set.contains(member))
    }

    fn delete_keys(&self, keys: &[String]) {
        let mut sets = self.sets.lock().expect("claim store lock poisoned");
        for key in keys {
            sets.remove(key);
        }
    }
}

/// In-memory claim registry, for tests and single-process deployments.
///
/// Implements the same set-membership scheme as the Redis backend over a
/// shared [`MemoryStore`]. There is no expiry; `refresh_active` is a
/// no-op and `shutdown_cleanup` deletes this peer's keys directly.
pub struct MemoryClaimRegistry {
    peer_id: String,
    store: MemoryStore,
    active: Mutex<HashSet<String>>,
}

impl MemoryClaimRegistry {
    /// Create a registry for the given peer over a shared store.
    pub fn new(peer_id: impl Into<String>, store: MemoryStore) -> Self {
        Self {
            peer_id: peer_id.into(),
            store,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// The (key, member) pairs an entity maps to for this peer.
    fn entries(&self, ids: &EntityIds) -> Vec<(String, String)> {
        let mut entries = vec![(id_key(&self.peer_id, ids.kind), ids.unique_id.clone())];
        if ids.kind == EntityKind::Gateway {
            if let Some(eui) = &ids.eui {
                entries.push((eui_key(&self.peer_id), eui.to_string()));
            }
        }
        entries
    }
}

#[async_trait::async_trait]
impl ClaimRegistry for MemoryClaimRegistry {
    async fn claim(&self, ids: &EntityIds) -> Result<(), ClaimError> {
        let entries = self.entries(ids);
        self.store.add(&entries);
        let mut active = self.active.lock().expect("active keys lock poisoned");
        for (key, _) in entries {
            active.insert(key);
        }
        Ok(())
    }

    async fn unclaim(&self, ids: &EntityIds) -> Result<(), ClaimError> {
        self.store.remove(&self.entries(ids));
        Ok(())
    }

    async fn get_peer_id(
        &self,
        ids: &EntityIds,
        candidates: &[String],
    ) -> Result<String, ClaimError> {
        for candidate in candidates {
            let held = match &ids.eui {
                Some(eui) if ids.kind == EntityKind::Gateway => {
                    self.store.contains(&eui_key(candidate), &eui.to_string())
                }
                _ => self
                    .store
                    .contains(&id_key(candidate, ids.kind), &ids.unique_id),
            };
            if held {
                return Ok(candidate.clone());
            }
        }
        Err(ClaimError::PeerUnavailable { kind: ids.kind })
    }

    async fn refresh_active(&self, _ttl: Duration) -> Result<(), ClaimError> {
        Ok(())
    }

    async fn shutdown_cleanup(&self) -> Result<(), ClaimError> {
        let keys: Vec<String> = {
            let mut active = self.active.lock().expect("active keys lock poisoned");
            active.drain().collect()
        };
        self.store.delete_keys(&keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_types::Eui64;

    #[tokio::test]
    async fn test_claim_unclaim_roundtrip() {
        let store = MemoryStore::new();
        let peer_a = MemoryClaimRegistry::new("A", store.clone());
        let peer_b = MemoryClaimRegistry::new("B", store.clone());

        let ids = EntityIds::gateway("gw1");
        peer_a.claim(&ids).await.unwrap();

        let candidates = ["A".to_string(), "B".to_string()];
        assert_eq!(peer_b.get_peer_id(&ids, &candidates).await.unwrap(), "A");

        peer_a.unclaim(&ids).await.unwrap();
        assert!(matches!(
            peer_b.get_peer_id(&ids, &candidates).await,
            Err(ClaimError::PeerUnavailable { kind: EntityKind::Gateway })
        ));
    }

    #[tokio::test]
    async fn test_eui_and_id_indexed_lookups() {
        let store = MemoryStore::new();
        let peer1 = MemoryClaimRegistry::new("peer1", store.clone());
        let peer2 = MemoryClaimRegistry::new("peer2", store.clone());

        let eui: Eui64 = "01-02-03-04-05-06-07-08".parse().unwrap();
        peer1
            .claim(&EntityIds::gateway_with_eui("foo", eui))
            .await
            .unwrap();
        peer2.claim(&EntityIds::gateway("bar")).await.unwrap();

        let candidates = ["peer1".to_string(), "peer2".to_string()];

        // ID-indexed lookup finds peer2's claim on "bar".
        let owner = store_lookup(&peer1, &EntityIds::gateway("bar"), &candidates).await;
        assert_eq!(owner, "peer2");

        // EUI-indexed lookup finds peer1's claim, regardless of the ID
        // the caller happens to know the gateway by.
        let owner = store_lookup(
            &peer2,
            &EntityIds::gateway_with_eui("unknown", eui),
            &candidates,
        )
        .await;
        assert_eq!(owner, "peer1");
    }

    async fn store_lookup(
        registry: &MemoryClaimRegistry,
        ids: &EntityIds,
        candidates: &[String],
    ) -> String {
        registry.get_peer_id(ids, candidates).await.unwrap()
    }

    #[tokio::test]
    async fn test_candidate_order_wins() {
        let store = MemoryStore::new();
        let peer1 = MemoryClaimRegistry::new("peer1", store.clone());
        let peer2 = MemoryClaimRegistry::new("peer2", store.clone());

        // Transient contention: both peers claim the same device.
        let ids = EntityIds::end_device("dev1");
        peer1.claim(&ids).await.unwrap();
        peer2.claim(&ids).await.unwrap();

        let owner = peer1
            .get_peer_id(&ids, &["peer2".to_string(), "peer1".to_string()])
            .await
            .unwrap();
        assert_eq!(owner, "peer2", "first candidate in caller order wins");
    }

    #[tokio::test]
    async fn test_shutdown_cleanup_drops_all_claims() {
        let store = MemoryStore::new();
        let peer_a = MemoryClaimRegistry::new("A", store.clone());
        let peer_b = MemoryClaimRegistry::new("B", store.clone());

        peer_a.claim(&EntityIds::gateway("gw1")).await.unwrap();
        peer_a.claim(&EntityIds::end_device("dev1")).await.unwrap();
        peer_b.claim(&EntityIds::gateway("gw2")).await.unwrap();

        peer_a.shutdown_cleanup().await.unwrap();

        let candidates = ["A".to_string(), "B".to_string()];
        assert!(peer_b
            .get_peer_id(&EntityIds::gateway("gw1"), &candidates)
            .await
            .is_err());
        assert!(peer_b
            .get_peer_id(&EntityIds::end_device("dev1"), &candidates)
            .await
            .is_err());
        // B's claims survive A's cleanup.
        assert_eq!(
            peer_b
                .get_peer_id(&EntityIds::gateway("gw2"), &candidates)
                .await
                .unwrap(),
            "B"
        );
    }
}
