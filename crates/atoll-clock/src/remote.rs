//! Helpers for reasoning about a remote clock over a network.

use crate::clock::Timestamp;

/// Network-corrected estimate of the server's current time: the server's
/// physical timestamp advanced by half the observed round trip.
pub fn adjusted_time(server_ts: Timestamp, rtt_ms: i64) -> i64 {
    server_ts.physical_ms + rtt_ms / 2
}

/// Milliseconds remaining until `end_ts` as seen from a client, given the
/// server's latest timestamp and the round trip to it. Negative when the
/// deadline has already passed.
pub fn time_left(end_ts: Timestamp, server_ts: Timestamp, rtt_ms: i64) -> i64 {
    end_ts.physical_ms - adjusted_time(server_ts, rtt_ms)
}
