//! Redis-backed claim registry.
//!
//! Claims are set membership per peer: `corral:claims:{peer}:{kind}`
//! holds the unique IDs that peer owns, and
//! `corral:claims:{peer}:gateway-eui` additionally indexes gateways by
//! EUI. All writes go out as pipelined `MULTI`/`EXEC` batches; ownership
//! lookups batch one `SISMEMBER` per candidate into a single round trip.
//!
//! Keys this peer has written are tracked locally so the keep-alive loop
//! can extend their TTLs; a peer that stops cleanly deletes its keys,
//! and one that crashes lets them expire.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use corral_types::{EntityIds, EntityKind};
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use crate::error::ClaimError;
use crate::registry::{eui_key, id_key, ClaimRegistry};

/// Claim registry backed by a Redis-compatible store.
pub struct RedisClaimRegistry {
    peer_id: String,
    conn: MultiplexedConnection,
    /// Keys this peer has written; the keep-alive loop maintains their TTL.
    active: Mutex<HashSet<String>>,
}

impl RedisClaimRegistry {
    /// Connect to the store at `url` and register as `peer_id`.
    pub async fn connect(url: &str, peer_id: impl Into<String>) -> Result<Self, ClaimError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let peer_id = peer_id.into();
        info!(peer_id = %peer_id, "connected to claim store");
        Ok(Self {
            peer_id,
            conn,
            active: Mutex::new(HashSet::new()),
        })
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
impl ClaimRegistry for RedisClaimRegistry {
    async fn claim(&self, ids: &EntityIds) -> Result<(), ClaimError> {
        let entries = self.entries(ids);

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, member) in &entries {
            pipe.sadd(key, member).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        let mut active = self.active.lock().expect("active keys lock poisoned");
        for (key, _) in entries {
            active.insert(key);
        }
        debug!(entity = %ids.routing_key(), "claimed");
        Ok(())
    }

    async fn unclaim(&self, ids: &EntityIds) -> Result<(), ClaimError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, member) in &self.entries(ids) {
            pipe.srem(key, member).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(entity = %ids.routing_key(), "unclaimed");
        Ok(())
    }

    async fn get_peer_id(
        &self,
        ids: &EntityIds,
        candidates: &[String],
    ) -> Result<String, ClaimError> {
        if candidates.is_empty() {
            return Err(ClaimError::PeerUnavailable { kind: ids.kind });
        }

        // One round trip: one membership check per candidate.
        let mut pipe = redis::pipe();
        for candidate in candidates {
            match &ids.eui {
                Some(eui) if ids.kind == EntityKind::Gateway => {
                    pipe.sismember(eui_key(candidate), eui.to_string());
                }
                _ => {
                    pipe.sismember(id_key(candidate, ids.kind), &ids.unique_id);
                }
            }
        }
        let mut conn = self.conn.clone();
        let held: Vec<bool> = pipe.query_async(&mut conn).await?;

        candidates
            .iter()
            .zip(held)
            .find(|(_, held)| *held)
            .map(|(candidate, _)| candidate.clone())
            .ok_or(ClaimError::PeerUnavailable { kind: ids.kind })
    }

    async fn refresh_active(&self, ttl: Duration) -> Result<(), ClaimError> {
        let keys: Vec<String> = {
            let active = self.active.lock().expect("active keys lock poisoned");
            active.iter().cloned().collect()
        };
        if keys.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in &keys {
            pipe.expire(key, ttl.as_secs() as i64).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(keys = keys.len(), "extended claim TTLs");
        Ok(())
    }

    async fn shutdown_cleanup(&self) -> Result<(), ClaimError> {
        let keys: Vec<String> = {
            let active = self.active.lock().expect("active keys lock poisoned");
            active.iter().cloned().collect()
        };
        if keys.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in &keys {
            pipe.del(key).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        self.active
            .lock()
            .expect("active keys lock poisoned")
            .clear();
        info!(keys = keys.len(), "deleted claims on shutdown");
        Ok(())
    }
}
