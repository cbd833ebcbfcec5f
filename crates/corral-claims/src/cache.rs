//! Caching, de-duplicating front end for a claim registry.
//!
//! Hot entities (a gateway streaming uplinks) would otherwise hit the
//! backing store on every routed message. [`ClaimCache`] keeps resolved
//! ownership keyed by entity unique ID in a bounded, TTL'd moka cache,
//! and collapses concurrent lookups for the same key into one backing
//! call via `try_get_with`. Writes pass through unchanged; backing
//! errors are shared with all waiters but never cached.

use std::sync::Arc;
use std::time::Duration;

use corral_types::EntityIds;
use moka::future::Cache;

use crate::error::ClaimError;
use crate::registry::ClaimRegistry;

/// An LFU, TTL-bounded cache in front of a [`ClaimRegistry`].
pub struct ClaimCache {
    inner: Arc<dyn ClaimRegistry>,
    /// entity unique ID -> owning peer ID
    cache: Cache<String, String>,
}

impl ClaimCache {
    /// Wrap a registry with the given capacity (entries) and entry TTL.
    pub fn new(inner: Arc<dyn ClaimRegistry>, capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Purge the entire cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait::async_trait]
impl ClaimRegistry for ClaimCache {
    async fn claim(&self, ids: &EntityIds) -> Result<(), ClaimError> {
        self.inner.claim(ids).await
    }

    async fn unclaim(&self, ids: &EntityIds) -> Result<(), ClaimError> {
        self.inner.unclaim(ids).await
    }

    async fn get_peer_id(
        &self,
        ids: &EntityIds,
        candidates: &[String],
    ) -> Result<String, ClaimError> {
        let key = ids.unique_id.clone();

        if let Some(cached) = self.cache.get(&key).await {
            if candidates.contains(&cached) {
                return Ok(cached);
            }
            // The cached owner is not among the caller's candidates; it
            // may be stale. Drop it and ask the backing store.
            self.cache.invalidate(&key).await;
        }

        // Single flight: concurrent callers for the same key share one
        // backing call and its result. Errors are shared, not cached.
        let inner = self.inner.clone();
        let fetch_ids = ids.clone();
        let fetch_candidates = candidates.to_vec();
        let resolved = self
            .cache
            .try_get_with(key.clone(), async move {
                inner.get_peer_id(&fetch_ids, &fetch_candidates).await
            })
            .await
            .map_err(unshare)?;

        // A concurrent caller with different candidates may have filled
        // the entry; only trust a result the caller actually asked about.
        if candidates.contains(&resolved) {
            Ok(resolved)
        } else {
            self.cache.invalidate(&key).await;
            let fresh = self.inner.get_peer_id(ids, candidates).await?;
            self.cache.insert(key, fresh.clone()).await;
            Ok(fresh)
        }
    }

    async fn refresh_active(&self, ttl: Duration) -> Result<(), ClaimError> {
        self.inner.refresh_active(ttl).await
    }

    async fn shutdown_cleanup(&self) -> Result<(), ClaimError> {
        self.inner.shutdown_cleanup().await
    }
}

/// Reconstruct a shareable error out of the `Arc` moka hands every waiter.
fn unshare(e: Arc<ClaimError>) -> ClaimError {
    match &*e {
        ClaimError::PeerUnavailable { kind } => ClaimError::PeerUnavailable { kind: *kind },
        other => ClaimError::Shared(other.to_string()),
    }
}
