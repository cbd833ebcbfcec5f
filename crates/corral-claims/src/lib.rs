//! Distributed entity-ownership claims.
//!
//! Stateful entities (gateway sessions, pinned devices) must be handled
//! by exactly one peer at a time. This crate provides:
//!
//! - [`ClaimRegistry`] — the registry trait: claim, unclaim, and resolve
//!   which of a set of candidate peers owns an entity.
//! - [`RedisClaimRegistry`] — the Redis-backed registry: set membership
//!   per peer, written in pipelined atomic batches, kept alive by TTLs.
//! - [`MemoryClaimRegistry`] — an in-memory registry over a shared
//!   [`MemoryStore`], for tests and single-process deployments.
//! - [`keepalive`] — the background loop that extends TTLs at `ttl/2`
//!   and deletes this peer's keys on shutdown.
//! - [`ClaimCache`] — a bounded, TTL'd cache in front of a registry with
//!   single-flight de-duplication of concurrent lookups.
//!
//! Claims are stored as set membership *per peer*, not as a single-owner
//! field per entity: claim and unclaim stay peer-local and lock-free,
//! and "who owns X" is answered by checking a small candidate list
//! against peer sets. Two peers can hold a claim transiently; callers
//! take the first candidate match.

mod backend;
mod cache;
mod error;
pub mod keepalive;
mod redis_registry;
mod registry;

pub use backend::ClaimBackend;
pub use cache::ClaimCache;
pub use error::ClaimError;
pub use keepalive::{spawn_keep_alive, KeepAliveHandle};
pub use redis_registry::RedisClaimRegistry;
pub use registry::{ClaimRegistry, MemoryClaimRegistry, MemoryStore};

/// Default claim-cache capacity (entries).
pub const DEFAULT_CACHE_SIZE: u64 = 16384;

/// Default claim-cache entry TTL.
pub const DEFAULT_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(60);

/// Default claim TTL maintained by the keep-alive loop.
pub const DEFAULT_CLAIM_TTL: std::time::Duration = std::time::Duration::from_secs(30);
