//! Consistent hashing ring implementation.

use std::collections::BTreeMap;

/// Consistent hash ring mapping routing keys to peer names.
///
/// Each peer name is mapped to multiple points on a u64 ring. A key is
/// resolved by hashing it onto the ring and walking clockwise to the
/// first point, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Ring point positions: position -> peer name.
    points: BTreeMap<u64, String>,
    /// Number of distinct peer names on the ring.
    names: usize,
}

impl HashRing {
    /// Build a ring from peer names with the given number of points per name.
    ///
    /// Duplicate names are collapsed; an empty name list yields an empty ring.
    pub fn new<I, S>(names: I, points_per_name: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut points = BTreeMap::new();
        let mut count = 0usize;
        for name in names {
            let name = name.as_ref();
            let mut inserted = false;
            for i in 0..points_per_name {
                inserted |= points.insert(point_position(name, i), name.to_string()).is_none();
            }
            if inserted {
                count += 1;
            }
        }
        Self {
            points,
            names: count,
        }
    }

    /// Resolve a routing key to a peer name.
    ///
    /// Returns `None` only when the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }

        let pos = key_position(key);

        // First point clockwise from the key, wrapping to the start.
        self.points
            .range(pos..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, name)| name.as_str())
    }

    /// Number of distinct peer names on the ring.
    pub fn len(&self) -> usize {
        self.names
    }

    /// Whether the ring has no peers.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Position of a peer's ring point: `blake3(name ++ index)` truncated to u64.
fn point_position(name: &str, index: u16) -> u64 {
    let mut input = Vec::with_capacity(name.len() + 2);
    input.extend_from_slice(name.as_bytes());
    input.extend_from_slice(&index.to_le_bytes());
    truncate_hash(&input)
}

/// Position of a routing key on the ring.
fn key_position(key: &str) -> u64 {
    truncate_hash(key.as_bytes())
}

fn truncate_hash(input: &[u8]) -> u64 {
    let hash = blake3::hash(input);
    let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().expect("8 bytes");
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring_returns_none() {
        let ring = HashRing::new(Vec::<String>::new(), 64);
        assert!(ring.is_empty());
        assert_eq!(ring.get("gateway:gw1"), None);
    }

    #[test]
    fn test_single_name_gets_all_keys() {
        let ring = HashRing::new(["peer1"], 64);
        for i in 0..100 {
            assert_eq!(ring.get(&format!("end-device:dev{i}")), Some("peer1"));
        }
    }

    #[test]
    fn test_deterministic_across_rebuilds() {
        let ring1 = HashRing::new(["a", "b", "c"], 64);
        let ring2 = HashRing::new(["a", "b", "c"], 64);
        for i in 0..200 {
            let key = format!("gateway:gw{i}");
            assert_eq!(ring1.get(&key), ring2.get(&key));
        }
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let ring1 = HashRing::new(["a", "b", "c"], 64);
        let ring2 = HashRing::new(["c", "a", "b"], 64);
        for i in 0..200 {
            let key = format!("end-device:dev{i}");
            assert_eq!(ring1.get(&key), ring2.get(&key));
        }
    }

    #[test]
    fn test_two_names_roughly_balanced() {
        let ring = HashRing::new(["peer1", "peer2"], 128);

        let total = 10_000;
        let count1 = (0..total)
            .filter(|i| ring.get(&format!("key{i}")) == Some("peer1"))
            .count();

        // Within 20% of 50/50.
        let ratio = count1 as f64 / total as f64;
        assert!(
            (0.3..=0.7).contains(&ratio),
            "distribution too skewed: {count1}/{total} ({ratio:.2})"
        );
    }

    #[test]
    fn test_add_name_only_fraction_moves() {
        let old = HashRing::new(["peer1", "peer2"], 128);
        let new = HashRing::new(["peer1", "peer2", "peer3"], 128);

        let total = 10_000;
        let moved = (0..total)
            .filter(|i| {
                let key = format!("key{i}");
                old.get(&key) != new.get(&key)
            })
            .count();

        // ~1/3 should move (consistent hashing property).
        let move_ratio = moved as f64 / total as f64;
        assert!(
            (0.1..=0.6).contains(&move_ratio),
            "too many or too few keys moved: {moved}/{total} ({move_ratio:.2})"
        );
    }

    #[test]
    fn test_removed_name_keys_redistribute_only() {
        let old = HashRing::new(["peer1", "peer2", "peer3"], 128);
        let new = HashRing::new(["peer1", "peer3"], 128);

        for i in 0..2000 {
            let key = format!("key{i}");
            let before = old.get(&key).unwrap();
            let after = new.get(&key).unwrap();
            if before != "peer2" {
                assert_eq!(before, after, "key {key} moved off a surviving peer");
            } else {
                assert_ne!(after, "peer2");
            }
        }
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let ring = HashRing::new(["peer1", "peer1", "peer2"], 64);
        assert_eq!(ring.len(), 2);
    }
}
