//! Error types for the claims crate.

use corral_types::EntityKind;

/// Errors produced by claim registries and the claim cache.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// None of the candidate peers holds a claim on the entity.
    #[error("no peer claims this {kind}")]
    PeerUnavailable {
        /// Kind of the entity that was looked up.
        kind: EntityKind,
    },

    /// The backing store failed.
    #[error("claim store error: {0}")]
    Storage(#[from] redis::RedisError),

    /// A backing-store failure surfaced through a shared single-flight
    /// lookup. Carries the original error text.
    #[error("claim lookup failed: {0}")]
    Shared(String),

    /// The configured claim backend is not known.
    #[error("unknown claim backend: {0:?}")]
    UnknownBackend(String),
}
