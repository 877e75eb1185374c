//! Weighted consistent-hashing ring.
//!
//! This crate implements a consistent hash ring that maps arbitrary byte
//! keys to member nodes while minimizing key remapping when membership
//! changes. Nodes can carry different weights, encoded as a proportional
//! number of virtual points on a 32-bit ring.
//!
//! The ring is safe for concurrent use: lookups take shared access and run
//! concurrently with each other, membership changes take exclusive access.
//! A lookup observes the ring entirely before or entirely after a given
//! mutation, never a partially applied one.
//!
//! The digest function is pluggable via [`RingHasher`]; the default is
//! CRC32 via [`Crc32Hasher`].

mod hasher;
mod ring;

pub use hasher::{Crc32Hasher, RingHasher};
pub use ring::{HashRing, DEFAULT_VNODES_PER_WEIGHT};
