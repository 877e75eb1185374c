//! Ring state, mutation, and lookup.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::hasher::{Crc32Hasher, RingHasher};

/// Number of virtual points placed on the ring per unit of node weight.
///
/// Higher values improve distribution uniformity at the cost of memory and
/// slower membership changes. Typical values: 50-200.
pub const DEFAULT_VNODES_PER_WEIGHT: u32 = 100;

/// Consecutive failed collision probes tolerated while placing a single
/// virtual point. The probe loop terminates for any non-constant hasher
/// long before this; the ceiling exists so a pathological hasher degrades
/// into a logged warning instead of an unbounded spin.
const MAX_COLLISION_PROBES: u64 = 1 << 16;

/// Weighted consistent-hashing ring.
///
/// Each physical node is mapped to `vnodes_per_weight * weight` virtual
/// points on a u32 ring. A key is routed to the node owning the first
/// point clockwise of the key's digest, wrapping past the top of the
/// digest space.
///
/// Key properties:
///   - minimal key remapping when nodes are added or removed
///   - weight-proportional key share via virtual points
///   - concurrent lock-guarded lookups and mutations
///
/// `N` is an opaque node identifier (`String`, `&str`, or an ID newtype);
/// it only needs to be cheap to clone, usable as a map key, and viewable
/// as bytes so virtual-point identities can be derived from it.
pub struct HashRing<N, H = Crc32Hasher> {
    hasher: H,
    vnodes_per_weight: u32,
    state: RwLock<RingState<N>>,
}

/// The guarded ring state.
///
/// `points` keeps the digest sequence unique, ascending, and mapped to
/// owners in a single structure, so every mutation of the sequence and the
/// digest->node mapping is atomic by construction. `weights` tracks each
/// physical node's configured weight.
struct RingState<N> {
    points: BTreeMap<u32, N>,
    weights: HashMap<N, u32>,
}

impl<N> HashRing<N>
where
    N: Clone + Eq + Hash + AsRef<[u8]>,
{
    /// Create an empty ring with the default CRC32 hasher and
    /// [`DEFAULT_VNODES_PER_WEIGHT`] virtual points per weight unit.
    pub fn new() -> Self {
        Self::with_config(Crc32Hasher, DEFAULT_VNODES_PER_WEIGHT)
    }
}

impl<N> Default for HashRing<N>
where
    N: Clone + Eq + Hash + AsRef<[u8]>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, H> HashRing<N, H>
where
    N: Clone + Eq + Hash + AsRef<[u8]>,
    H: RingHasher,
{
    /// Create an empty ring with a custom hasher.
    pub fn with_hasher(hasher: H) -> Self {
        Self::with_config(hasher, DEFAULT_VNODES_PER_WEIGHT)
    }

    /// Create an empty ring with a custom hasher and virtual-point count
    /// per weight unit.
    pub fn with_config(hasher: H, vnodes_per_weight: u32) -> Self {
        Self {
            hasher,
            vnodes_per_weight,
            state: RwLock::new(RingState {
                points: BTreeMap::new(),
                weights: HashMap::new(),
            }),
        }
    }

    /// Add a node with weight 1.
    pub fn add_node(&self, node: N) {
        self.add_node_weighted(node, 1);
    }

    /// Add a node with the given weight, placing
    /// `vnodes_per_weight * weight` virtual points for it.
    ///
    /// Re-adding a node that is already present is an upsert: its existing
    /// points are removed first, then re-placed at the new weight. A weight
    /// of zero means absent: the node is removed from the ring entirely.
    pub fn add_node_weighted(&self, node: N, weight: u32) {
        let mut state = self.state.write();

        // Upsert: drop any points the node already owns before re-placing.
        state.points.retain(|_, owner| *owner != node);

        if weight == 0 {
            state.weights.remove(&node);
            debug!(vnodes = state.points.len(), "zero weight, node left ring");
            return;
        }

        let total = u64::from(self.vnodes_per_weight) * u64::from(weight);
        let mut index: u64 = 0;
        let mut placed: u64 = 0;
        let mut probes: u64 = 0;

        while placed < total {
            let identity = vnode_identity(node.as_ref(), index);
            let digest = self.hasher.digest(&identity);
            index += 1;

            // Collision with an existing point (possibly one placed earlier
            // in this call): advance to the next candidate index.
            if state.points.contains_key(&digest) {
                probes += 1;
                if probes >= MAX_COLLISION_PROBES {
                    warn!(
                        placed,
                        total, "placement probe ceiling hit, node gets fewer points"
                    );
                    break;
                }
                continue;
            }

            probes = 0;
            state.points.insert(digest, node.clone());
            placed += 1;
        }

        state.weights.insert(node, weight);
        debug!(points = placed, weight, "added node to ring");
    }

    /// Remove a node and all its virtual points.
    ///
    /// Only keys whose nearest clockwise point belonged to this node are
    /// remapped; every other assignment is untouched. Removing a node that
    /// is not on the ring is a no-op.
    pub fn remove_node(&self, node: &N) {
        let mut state = self.state.write();
        if state.weights.remove(node).is_none() {
            return;
        }
        state.points.retain(|_, owner| *owner != *node);
        debug!(vnodes = state.points.len(), "removed node from ring");
    }

    /// Return the primary node responsible for `key`, or `None` if the
    /// ring is empty.
    ///
    /// The key's digest is binary-searched against the sorted points; if it
    /// lands past the largest point, the lookup wraps to the smallest.
    pub fn get_node(&self, key: impl AsRef<[u8]>) -> Option<N> {
        let digest = self.hasher.digest(key.as_ref());
        let state = self.state.read();
        state
            .points
            .range(digest..)
            .next()
            .or_else(|| state.points.iter().next())
            .map(|(_, owner)| owner.clone())
    }

    /// Return up to `min(replicas, node_count)` distinct nodes for `key`,
    /// in clockwise order starting at the primary owner.
    ///
    /// Virtual points whose owner was already selected are skipped, so the
    /// result never contains duplicates. An empty ring or a zero replica
    /// count yields an empty vector.
    pub fn get_nodes(&self, key: impl AsRef<[u8]>, replicas: usize) -> Vec<N> {
        if replicas == 0 {
            return Vec::new();
        }

        let digest = self.hasher.digest(key.as_ref());
        let state = self.state.read();
        if state.points.is_empty() {
            return Vec::new();
        }

        let wanted = replicas.min(state.weights.len());
        let mut owners = Vec::with_capacity(wanted);

        // Clockwise walk with wraparound: everything at or after the key's
        // digest, then everything before it.
        let after = state.points.range(digest..);
        let before = state.points.range(..digest);

        for (_, owner) in after.chain(before) {
            if !owners.contains(owner) {
                owners.push(owner.clone());
                if owners.len() == wanted {
                    break;
                }
            }
        }

        owners
    }

    /// Number of physical nodes on the ring.
    pub fn node_count(&self) -> usize {
        self.state.read().weights.len()
    }

    /// Total number of virtual points on the ring.
    pub fn vnode_count(&self) -> usize {
        self.state.read().points.len()
    }

    /// Whether the ring has no nodes.
    pub fn is_empty(&self) -> bool {
        self.state.read().weights.is_empty()
    }

    /// The configured weight of `node`, if it is on the ring.
    pub fn weight_of(&self, node: &N) -> Option<u32> {
        self.state.read().weights.get(node).copied()
    }

    /// All physical nodes currently on the ring, in unspecified order.
    pub fn nodes(&self) -> Vec<N> {
        self.state.read().weights.keys().cloned().collect()
    }
}

/// Virtual-point identity for `(node, index)`: the node's bytes, a dash,
/// and the decimal index. Deterministic, so re-adding a node under the same
/// configuration reproduces the same digests.
fn vnode_identity(node: &[u8], index: u64) -> Vec<u8> {
    let mut identity = Vec::with_capacity(node.len() + 21);
    identity.extend_from_slice(node);
    identity.push(b'-');
    identity.extend_from_slice(index.to_string().as_bytes());
    identity
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Fixed digest table: vnode identities and keys get hand-picked ring
    /// positions so clockwise behavior is checked exactly.
    struct TableHasher;

    impl RingHasher for TableHasher {
        fn digest(&self, data: &[u8]) -> u32 {
            match data {
                b"A-0" => 10,
                b"B-0" => 30,
                b"C-0" => 50,
                b"k1" => 5,
                b"k2" => 25,
                b"k3" => 45,
                b"k4" => 55,
                other => panic!("unexpected digest input: {:?}", other),
            }
        }
    }

    fn fixed_ring() -> HashRing<&'static str, TableHasher> {
        let ring = HashRing::with_config(TableHasher, 1);
        ring.add_node("A");
        ring.add_node("B");
        ring.add_node("C");
        ring
    }

    #[test]
    fn clockwise_lookup_with_wraparound() {
        let ring = fixed_ring();
        assert_eq!(ring.get_node("k1"), Some("A"));
        assert_eq!(ring.get_node("k2"), Some("B"));
        assert_eq!(ring.get_node("k3"), Some("C"));
        // 55 is past the last point (50): wraps to the smallest (10).
        assert_eq!(ring.get_node("k4"), Some("A"));
    }

    #[test]
    fn removal_remaps_only_the_removed_nodes_keys() {
        let ring = fixed_ring();
        ring.remove_node(&"B");
        assert_eq!(ring.get_node("k1"), Some("A"));
        // k2 was B's; its next clockwise point is now C at 50.
        assert_eq!(ring.get_node("k2"), Some("C"));
        assert_eq!(ring.get_node("k3"), Some("C"));
        assert_eq!(ring.get_node("k4"), Some("A"));
    }

    #[test]
    fn replicas_walk_clockwise_from_primary() {
        let ring = fixed_ring();
        assert_eq!(ring.get_nodes("k1", 2), vec!["A", "B"]);
        assert_eq!(ring.get_nodes("k3", 2), vec!["C", "A"]);
    }

    #[test]
    fn empty_ring_lookups_are_sentinels() {
        let ring: HashRing<String> = HashRing::new();
        assert!(ring.is_empty());
        assert_eq!(ring.get_node("anything"), None);
        assert!(ring.get_nodes("anything", 3).is_empty());
    }

    #[test]
    fn zero_replicas_is_empty() {
        let ring = fixed_ring();
        assert!(ring.get_nodes("k1", 0).is_empty());
    }

    #[test]
    fn single_node_owns_everything() {
        let ring: HashRing<String> = HashRing::new();
        ring.add_node("solo".to_string());
        for i in 0..1_000 {
            assert_eq!(ring.get_node(format!("key-{i}")).as_deref(), Some("solo"));
        }
    }

    #[test]
    fn two_equal_nodes_are_balanced() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        ring.add_node("n2");

        let total = 200_000;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for i in 0..total {
            let owner = ring.get_node(format!("key-{i}")).unwrap();
            *counts.entry(owner).or_default() += 1;
        }

        let share = counts["n1"] as f64 / total as f64;
        assert!(
            (0.45..=0.55).contains(&share),
            "unbalanced: n1 share {share:.3}"
        );
    }

    #[test]
    fn weighted_nodes_get_proportional_share() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node_weighted("n1", 1);
        ring.add_node_weighted("n2", 2);

        let total = 200_000;
        let mut n1 = 0usize;
        for i in 0..total {
            if ring.get_node(format!("key-{i}")).unwrap() == "n1" {
                n1 += 1;
            }
        }

        // Target is 1/3; allow +-5 percentage points.
        let share = n1 as f64 / total as f64;
        assert!(
            (0.283..=0.383).contains(&share),
            "bad weight split: n1 share {share:.3}"
        );
    }

    #[test]
    fn removal_is_minimal_and_readd_restores() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        ring.add_node("n2");
        ring.add_node("n3");

        let keys: Vec<String> = (0..10_000).map(|i| format!("key-{i}")).collect();
        let before: Vec<&str> = keys.iter().map(|k| ring.get_node(k).unwrap()).collect();

        ring.remove_node(&"n2");
        let after: Vec<&str> = keys.iter().map(|k| ring.get_node(k).unwrap()).collect();

        for (i, (b, a)) in before.iter().zip(after.iter()).enumerate() {
            if *b != "n2" {
                assert_eq!(b, a, "key {i} moved though its owner was not removed");
            } else {
                assert_ne!(*a, "n2", "key {i} still routed to a removed node");
            }
        }

        // Identical configuration places identical points, so the original
        // assignment comes back.
        ring.add_node("n2");
        let restored: Vec<&str> = keys.iter().map(|k| ring.get_node(k).unwrap()).collect();
        assert_eq!(before, restored);
    }

    #[test]
    fn remove_drops_all_points_and_weight() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        ring.add_node("n2");
        assert_eq!(ring.vnode_count(), 200);

        ring.remove_node(&"n1");
        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.vnode_count(), 100);
        assert_eq!(ring.weight_of(&"n1"), None);
        assert_eq!(ring.weight_of(&"n2"), Some(1));
    }

    #[test]
    fn remove_absent_node_is_noop() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        ring.remove_node(&"ghost");
        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.vnode_count(), 100);
    }

    #[test]
    fn replicas_are_distinct_and_capped() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        ring.add_node("n2");
        ring.add_node("n3");

        for i in 0..100 {
            let owners = ring.get_nodes(format!("key-{i}"), 3);
            assert_eq!(owners.len(), 3);
            let mut unique = owners.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 3, "duplicate replica for key-{i}");
        }

        // More replicas requested than nodes exist: cap, don't pad.
        assert_eq!(ring.get_nodes("key", 5).len(), 3);
        ring.remove_node(&"n3");
        assert_eq!(ring.get_nodes("key", 5).len(), 2);
    }

    #[test]
    fn first_replica_is_the_primary() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        ring.add_node("n2");
        ring.add_node("n3");

        for i in 0..100 {
            let key = format!("key-{i}");
            let primary = ring.get_node(&key).unwrap();
            assert_eq!(ring.get_nodes(&key, 2)[0], primary);
        }
    }

    #[test]
    fn lookups_are_deterministic() {
        let build = || {
            let ring: HashRing<&str> = HashRing::new();
            ring.add_node_weighted("n1", 1);
            ring.add_node_weighted("n2", 3);
            ring
        };
        let r1 = build();
        let r2 = build();

        for i in 0..1_000 {
            let key = format!("key-{i}");
            assert_eq!(r1.get_node(&key), r2.get_node(&key));
            assert_eq!(r1.get_nodes(&key, 2), r2.get_nodes(&key, 2));
        }
    }

    #[test]
    fn readd_is_an_upsert() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        assert_eq!(ring.vnode_count(), 100);

        // Re-add at a new weight: old points are replaced, not stacked.
        ring.add_node_weighted("n1", 2);
        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.vnode_count(), 200);
        assert_eq!(ring.weight_of(&"n1"), Some(2));

        ring.add_node("n1");
        assert_eq!(ring.vnode_count(), 100);
    }

    #[test]
    fn zero_weight_means_absent() {
        let ring: HashRing<&str> = HashRing::new();
        ring.add_node("n1");
        ring.add_node("n2");

        ring.add_node_weighted("n1", 0);
        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.vnode_count(), 100);
        assert_eq!(ring.weight_of(&"n1"), None);
        for i in 0..100 {
            assert_eq!(ring.get_node(format!("key-{i}")), Some("n2"));
        }
    }

    #[test]
    fn collisions_resolve_to_full_point_count() {
        // Degenerate hasher: every input maps into a tiny digest space, so
        // placement hits constant collisions yet must still produce one
        // point per (identity, weight-unit) up to the space's capacity.
        struct CrampedHasher;
        impl RingHasher for CrampedHasher {
            fn digest(&self, data: &[u8]) -> u32 {
                let mut acc: u32 = 0;
                for &b in data {
                    acc = acc.wrapping_mul(31).wrapping_add(u32::from(b));
                }
                acc % 1024
            }
        }
        let ring = HashRing::with_config(CrampedHasher, 100);
        ring.add_node("n1");
        ring.add_node("n2");
        assert_eq!(ring.vnode_count(), 200);
    }

    #[test]
    fn pathological_hasher_hits_probe_ceiling_without_hanging() {
        // A constant hasher can only ever place one point. The probe
        // ceiling turns the would-be infinite loop into a short ring.
        struct ConstantHasher;
        impl RingHasher for ConstantHasher {
            fn digest(&self, _data: &[u8]) -> u32 {
                42
            }
        }
        let ring = HashRing::with_config(ConstantHasher, 4);
        ring.add_node("n1");
        assert_eq!(ring.vnode_count(), 1);
        assert_eq!(ring.get_node("key"), Some("n1"));
    }

    #[test]
    fn concurrent_reads_match_sequential() {
        let ring: HashRing<String> = HashRing::new();
        ring.add_node("n1".to_string());
        ring.add_node("n2".to_string());
        ring.add_node("n3".to_string());

        let keys: Vec<String> = (0..5_000).map(|i| format!("key-{i}")).collect();
        let expected: Vec<String> = keys.iter().map(|k| ring.get_node(k).unwrap()).collect();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for (key, want) in keys.iter().zip(expected.iter()) {
                        assert_eq!(ring.get_node(key).as_ref(), Some(want));
                    }
                });
            }
        });
    }

    #[test]
    fn reads_never_observe_a_torn_ring() {
        let ring: HashRing<String> = HashRing::new();
        ring.add_node("n1".to_string());
        ring.add_node("n2".to_string());

        std::thread::scope(|s| {
            // Writers churn a third node in and out.
            s.spawn(|| {
                for _ in 0..200 {
                    ring.add_node("n3".to_string());
                    ring.remove_node(&"n3".to_string());
                }
            });

            // Readers must always see a complete ring: a primary exists,
            // replica sets are distinct and properly capped.
            for _ in 0..4 {
                s.spawn(|| {
                    for i in 0..10_000 {
                        let key = format!("key-{i}");
                        let owner = ring.get_node(&key).expect("ring never empty");
                        assert!(owner.starts_with('n'));

                        let owners = ring.get_nodes(&key, 3);
                        assert!(!owners.is_empty());
                        assert!(owners.len() <= 3);
                        let mut unique = owners.clone();
                        unique.sort();
                        unique.dedup();
                        assert_eq!(unique.len(), owners.len(), "duplicate replicas");
                    }
                });
            }
        });
    }
}
