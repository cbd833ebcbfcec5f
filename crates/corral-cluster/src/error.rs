//! Error types for the cluster crate.

use corral_types::Role;

/// Errors produced by peer discovery and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// No peer is currently available for the requested role.
    #[error("no peer available for role {role}")]
    PeerUnavailable {
        /// The role the caller asked for.
        role: Role,
    },

    /// The peer's outbound channel could not be constructed when it was
    /// discovered. The error is replayed to every caller that asks for
    /// the connection until the next discovery pass replaces the peer.
    #[error("peer dial failed: {0}")]
    Dial(String),

    /// The peer was drained after disappearing from discovery and its
    /// connection has been closed.
    #[error("peer connection closed")]
    ConnectionClosed,

    /// A DNS lookup failed.
    #[error("resolution failed: {0}")]
    Resolve(String),

    /// A claim-registry lookup failed while resolving an owning peer.
    #[error("claim lookup failed: {0}")]
    Claims(#[from] corral_claims::ClaimError),
}
