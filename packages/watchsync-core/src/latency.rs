//! Latency measurement.
//!
//! The session probes the relay every 30 seconds with a ping carrying
//! the local clock; the pong echoes it back and the round trip is the
//! difference. Remote playback controls are then advanced by the local
//! one-way delay (half the round trip) on top of whatever delay the
//! relay reports for the message itself.

use chrono::{DateTime, Duration, Utc};

/// Seconds between latency probes.
pub const PROBE_INTERVAL_SECS: i64 = 30;

/// Tracks ping/pong round trips and exposes the derived one-way delay.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    last_probe_at: Option<DateTime<Utc>>,
    outstanding: Option<i64>,
    rtt_ms: Option<i64>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether it is time to send the next probe. True immediately
    /// after construction so a fresh connection measures right away.
    pub fn should_probe(&self, now: DateTime<Utc>) -> bool {
        match self.last_probe_at {
            None => true,
            Some(at) => now - at >= Duration::seconds(PROBE_INTERVAL_SECS),
        }
    }

    /// Record an outgoing probe and return the `client_time` to send.
    pub fn probe(&mut self, now: DateTime<Utc>) -> i64 {
        let client_time = now.timestamp_millis();
        self.last_probe_at = Some(now);
        self.outstanding = Some(client_time);
        client_time
    }

    /// Record a pong. Returns the measured round trip in milliseconds,
    /// or None for a stale or unsolicited pong.
    pub fn on_pong(&mut self, client_time: i64, now: DateTime<Utc>) -> Option<i64> {
        if self.outstanding != Some(client_time) {
            tracing::debug!(client_time, "Ignoring stale pong");
            return None;
        }
        self.outstanding = None;

        let rtt = (now.timestamp_millis() - client_time).max(0);
        self.rtt_ms = Some(rtt);
        tracing::debug!(rtt_ms = rtt, "Latency measured");
        Some(rtt)
    }

    /// Last measured round trip, milliseconds.
    pub fn rtt_ms(&self) -> Option<i64> {
        self.rtt_ms
    }

    /// One-way delay in seconds — half the round trip, zero until the
    /// first measurement completes.
    pub fn one_way_secs(&self) -> f64 {
        self.rtt_ms.map(|rtt| rtt as f64 / 2000.0).unwrap_or(0.0)
    }

    /// Drop any in-flight probe, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.outstanding = None;
        self.last_probe_at = None;
    }
}
