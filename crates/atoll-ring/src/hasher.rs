//! Pluggable digest functions for ring placement.

/// Digest function used to place keys and virtual points on the ring.
///
/// Implementations must be deterministic within a process: the same input
/// always produces the same digest. Distribution quality directly affects
/// how evenly keys spread across nodes, so a hasher trades speed against
/// uniformity.
pub trait RingHasher {
    /// Compute a 32-bit digest of `data`.
    fn digest(&self, data: &[u8]) -> u32;
}

/// Default hasher: CRC32 (IEEE polynomial) via `crc32fast`.
///
/// Fast, deterministic, and uniform enough for moderate-scale rings.
/// Substitute a different [`RingHasher`] at construction time when
/// distribution quality matters more than speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Hasher;

impl RingHasher for Crc32Hasher {
    fn digest(&self, data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}
