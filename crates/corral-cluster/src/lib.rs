//! Cluster peer discovery and request routing.
//!
//! This crate keeps a live view of the peers that make up a Corral
//! deployment and answers "which peer should I talk to for role R
//! (and entity E)?":
//!
//! - [`Peer`] — a handle to one cluster member: name, roles, dial target
//!   and an owned (lazily established) gRPC channel.
//! - [`discovery`] — the periodic DNS discovery engine that reconciles
//!   the peer set, drains stale peers and rebuilds the per-role hash rings.
//! - [`Cluster`] — the façade other services use to resolve peers, by
//!   random choice, consistent hashing or claim-registry ownership.
//! - [`Resolver`] — the name-resolution seam: a real hickory-backed
//!   implementation and a static one for tests and air-gapped setups.

mod cluster;
pub mod discovery;
mod error;
mod peer;
mod resolver;
mod snapshot;

#[cfg(test)]
mod tests;

pub use cluster::Cluster;
pub use discovery::{DiscoveryConfig, DiscoveryHandle, DiscoveryTarget};
pub use error::ClusterError;
pub use peer::Peer;
pub use resolver::{DnsResolver, Resolver, SrvTarget, StaticResolver};
