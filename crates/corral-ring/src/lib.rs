//! Consistent hash ring for sharding requests across cluster peers.
//!
//! This crate implements a consistent hash ring that maps arbitrary routing
//! keys (strings) to peer names. Each peer contributes multiple points on a
//! u64 ring, positioned at `blake3(name ++ point_index)`; a key resolves to
//! the first point clockwise from its own hash. Adding or removing a peer
//! remaps only a small fraction of keys.
//!
//! Discovery rebuilds one ring per cluster role from scratch on every pass,
//! so the ring has no mutation API beyond construction.

mod ring;

pub use ring::HashRing;

/// Default number of ring points per peer name.
pub const DEFAULT_POINTS_PER_NAME: u16 = 64;
