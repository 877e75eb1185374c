//! Toy last-writer-wins key/value store.
//!
//! Values are versioned with HLC timestamps from `atoll-clock`. A write is
//! accepted only when its timestamp is *guaranteed* to be newer than the
//! incumbent's; ambiguous orderings keep the incumbent, so replicas that
//! apply the same set of writes converge regardless of delivery order.

mod store;

pub use store::{LwwStore, VersionedValue};
