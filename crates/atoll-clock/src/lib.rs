//! Hybrid logical clock with bounded uncertainty.
//!
//! An HLC combines wall-clock time with a logical counter: timestamps
//! advance monotonically even when the wall clock stalls or jumps
//! backwards, and merging a remote timestamp preserves causality. Each
//! timestamp additionally carries a symmetric uncertainty bound, so a
//! consumer can ask whether one event is *guaranteed* to have happened
//! after another rather than merely appearing to.

mod clock;
mod remote;

pub use clock::{ClockConfig, HlcClock, Timestamp};
pub use remote::{adjusted_time, time_left};
