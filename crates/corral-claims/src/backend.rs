//! Claim backend selection.
//!
//! The backend is chosen once from configuration and resolved into a
//! concrete registry at startup; nothing re-dispatches on the backend
//! name per call. Unknown names fail fast at parse time.

use std::sync::Arc;

use crate::error::ClaimError;
use crate::redis_registry::RedisClaimRegistry;
use crate::registry::{ClaimRegistry, MemoryClaimRegistry, MemoryStore};

/// A configured claim backend.
#[derive(Debug, Clone)]
pub enum ClaimBackend {
    /// Redis-compatible store at the given URL.
    Redis {
        /// Connection URL, e.g. `redis://127.0.0.1:6379`.
        url: String,
    },
    /// Process-local memory. Claims are not visible to other peers;
    /// suitable for single-node deployments and tests.
    Memory,
}

impl ClaimBackend {
    /// Parse a backend selector from configuration.
    pub fn from_config(backend: &str, redis_url: &str) -> Result<Self, ClaimError> {
        match backend {
            "redis" => Ok(ClaimBackend::Redis {
                url: redis_url.to_string(),
            }),
            "memory" => Ok(ClaimBackend::Memory),
            other => Err(ClaimError::UnknownBackend(other.to_string())),
        }
    }

    /// Resolve the backend into a concrete registry for this peer.
    pub async fn connect(self, peer_id: &str) -> Result<Arc<dyn ClaimRegistry>, ClaimError> {
        match self {
            ClaimBackend::Redis { url } => {
                Ok(Arc::new(RedisClaimRegistry::connect(&url, peer_id).await?))
            }
            ClaimBackend::Memory => Ok(Arc::new(MemoryClaimRegistry::new(
                peer_id,
                MemoryStore::new(),
            ))),
        }
    }
}
