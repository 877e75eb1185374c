//! HLC state and timestamp arithmetic.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Configuration for an [`HlcClock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockConfig {
    /// Maximum tolerated drift of the local wall clock, in milliseconds.
    ///
    /// Used as the minimum uncertainty attached to locally produced
    /// timestamps. Zero falls back to a 5 ms default.
    pub max_drift_ms: i64,
}

const DEFAULT_MAX_DRIFT_MS: i64 = 5;

/// A hybrid-logical-clock timestamp with a bounded uncertainty interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Wall-clock component, milliseconds since the Unix epoch.
    pub physical_ms: i64,
    /// Logical counter disambiguating events within one millisecond.
    pub logical: u16,
    /// Symmetric error bound (+-milliseconds) around `physical_ms`.
    pub uncertainty_ms: i64,
}

impl Timestamp {
    /// Whether this timestamp is guaranteed to come after `other`.
    ///
    /// Holds only when the earliest possible time of `self` strictly
    /// exceeds the latest possible time of `other` given both uncertainty
    /// bounds, or when the physical components are equal and the logical
    /// counter orders them. A `false` result means the ordering is
    /// ambiguous, not that `other` came first.
    pub fn definitely_after(&self, other: &Timestamp) -> bool {
        if self.physical_ms > other.physical_ms + other.uncertainty_ms {
            return true;
        }
        self.physical_ms == other.physical_ms && self.logical > other.logical
    }
}

struct ClockState {
    physical_ms: i64,
    logical: u16,
    uncertainty_ms: i64,
}

/// Hybrid logical clock.
///
/// Safe for concurrent use; instantiate once per process and stamp every
/// local event through it.
pub struct HlcClock {
    state: Mutex<ClockState>,
    max_drift_ms: i64,
}

impl HlcClock {
    /// Create a clock. The initial uncertainty equals the configured
    /// maximum drift.
    pub fn new(config: ClockConfig) -> Self {
        let max_drift_ms = if config.max_drift_ms == 0 {
            DEFAULT_MAX_DRIFT_MS
        } else {
            config.max_drift_ms
        };
        Self {
            state: Mutex::new(ClockState {
                physical_ms: 0,
                logical: 0,
                uncertainty_ms: max_drift_ms,
            }),
            max_drift_ms,
        }
    }

    /// Produce a timestamp for a local event.
    ///
    /// The physical component advances monotonically; when the wall clock
    /// does not move forward, the logical counter increments instead. The
    /// attached uncertainty is the configured maximum drift.
    pub fn now(&self) -> Timestamp {
        let mut state = self.state.lock();

        let wall = unix_millis();
        if wall > state.physical_ms {
            state.physical_ms = wall;
            state.logical = 0;
        } else {
            state.logical = state.logical.wrapping_add(1);
        }
        state.uncertainty_ms = self.max_drift_ms;

        Timestamp {
            physical_ms: state.physical_ms,
            logical: state.logical,
            uncertainty_ms: state.uncertainty_ms,
        }
    }

    /// Merge a remote timestamp into the local state.
    ///
    /// `rtt_ms` is the estimated round-trip time to the sender. The local
    /// components advance so that future local timestamps are causally
    /// after `remote`, and uncertainty widens to cover the remote bound
    /// plus half the round trip.
    pub fn update(&self, remote: Timestamp, rtt_ms: i64) {
        let mut state = self.state.lock();

        let wall = unix_millis();
        let max_physical = state.physical_ms.max(remote.physical_ms).max(wall);

        state.logical = if max_physical == state.physical_ms && max_physical == remote.physical_ms
        {
            state.logical.max(remote.logical).wrapping_add(1)
        } else if max_physical == state.physical_ms {
            state.logical.wrapping_add(1)
        } else if max_physical == remote.physical_ms {
            remote.logical.wrapping_add(1)
        } else {
            0
        };
        state.physical_ms = max_physical;

        let remote_uncertainty = remote.uncertainty_ms + rtt_ms / 2;
        state.uncertainty_ms = state.uncertainty_ms.max(remote_uncertainty);
    }

    /// Current uncertainty bound in milliseconds: the maximum of the local
    /// drift configuration and any remote uncertainty seen via
    /// [`update`](Self::update).
    pub fn uncertainty(&self) -> i64 {
        self.state.lock().uncertainty_ms
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
