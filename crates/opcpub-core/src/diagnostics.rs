// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Publisher diagnostics counters.
//!
//! One [`Diagnostics`] instance is owned by each publisher context and shared
//! (via `Arc`) by the notification pipeline and the dispatch adapter.
//!
//! All counters live behind a single lock so that [`Diagnostics::snapshot`]
//! is a consistent point-in-time read: a reader never observes `events_sent`
//! for a message whose `events_received` increment it cannot also see.
//! Counters only grow; there is no reset short of dropping the instance.
//!
//! # Example
//!
//! ```
//! use opcpub_core::diagnostics::Diagnostics;
//!
//! let diag = Diagnostics::new();
//! diag.increment_received();
//! diag.increment_sent(128);
//!
//! let snapshot = diag.snapshot();
//! assert_eq!(snapshot.events_received, 1);
//! assert_eq!(snapshot.events_sent, 1);
//! assert_eq!(snapshot.sent_bytes, 128);
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostics
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    events_received: u64,
    events_sent: u64,
    send_failures: u64,
    messages_enqueued: u64,
    messages_suppressed: u64,
    heartbeats_emitted: u64,
    heartbeats_skipped: u64,
    sent_bytes: u64,
}

/// Monotonic publisher counters.
#[derive(Debug)]
pub struct Diagnostics {
    counters: Mutex<Counters>,
    started_at: DateTime<Utc>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started_at: Utc::now(),
        }
    }

    /// Records one raw notification from a device transport.
    pub fn increment_received(&self) {
        self.counters.lock().events_received += 1;
    }

    /// Records one message accepted by the outbound transport.
    pub fn increment_sent(&self, bytes: u64) {
        let mut counters = self.counters.lock();
        counters.events_sent += 1;
        counters.sent_bytes += bytes;
    }

    /// Records one message dropped after exhausting its send attempts.
    pub fn increment_send_failure(&self) {
        self.counters.lock().send_failures += 1;
    }

    /// Records `count` messages dropped at once (e.g. abandoned at shutdown).
    pub fn add_send_failures(&self, count: u64) {
        if count > 0 {
            self.counters.lock().send_failures += count;
        }
    }

    /// Records one message handed to the dispatch queue.
    pub fn increment_enqueued(&self) {
        self.counters.lock().messages_enqueued += 1;
    }

    /// Records one notification suppressed by item shaping.
    pub fn increment_suppressed(&self) {
        self.counters.lock().messages_suppressed += 1;
    }

    /// Records one heartbeat message produced.
    pub fn increment_heartbeat(&self) {
        self.counters.lock().heartbeats_emitted += 1;
    }

    /// Records one heartbeat tick dropped because delivery was saturated.
    pub fn increment_heartbeat_skipped(&self) {
        self.counters.lock().heartbeats_skipped += 1;
    }

    /// Returns a consistent point-in-time copy of all counters.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let counters = *self.counters.lock();
        DiagnosticsSnapshot {
            events_received: counters.events_received,
            events_sent: counters.events_sent,
            send_failures: counters.send_failures,
            messages_enqueued: counters.messages_enqueued,
            messages_suppressed: counters.messages_suppressed,
            heartbeats_emitted: counters.heartbeats_emitted,
            heartbeats_skipped: counters.heartbeats_skipped,
            sent_bytes: counters.sent_bytes,
            started_at: self.started_at,
            taken_at: Utc::now(),
        }
    }
}

// =============================================================================
// DiagnosticsSnapshot
// =============================================================================

/// A point-in-time read of [`Diagnostics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    /// Raw notifications received from device transports.
    pub events_received: u64,
    /// Messages acknowledged by the outbound transport.
    pub events_sent: u64,
    /// Messages dropped after failing to send.
    pub send_failures: u64,
    /// Messages handed to the dispatch queue.
    pub messages_enqueued: u64,
    /// Notifications suppressed by shaping (skip-first, not registered).
    pub messages_suppressed: u64,
    /// Heartbeat messages produced.
    pub heartbeats_emitted: u64,
    /// Heartbeat ticks dropped under saturation.
    pub heartbeats_skipped: u64,
    /// Total payload bytes accepted by the outbound transport.
    pub sent_bytes: u64,
    /// When the counters were created.
    pub started_at: DateTime<Utc>,
    /// When this snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl DiagnosticsSnapshot {
    /// Messages enqueued but neither sent nor failed yet.
    pub fn in_flight(&self) -> u64 {
        self.messages_enqueued
            .saturating_sub(self.events_sent)
            .saturating_sub(self.send_failures)
    }

    /// Seconds between counter creation and this snapshot.
    pub fn uptime_secs(&self) -> i64 {
        (self.taken_at - self.started_at).num_seconds()
    }
}

impl fmt::Display for DiagnosticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} sent={} failures={} enqueued={} suppressed={} heartbeats={}",
            self.events_received,
            self.events_sent,
            self.send_failures,
            self.messages_enqueued,
            self.messages_suppressed,
            self.heartbeats_emitted
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_start_at_zero() {
        let snapshot = Diagnostics::new().snapshot();
        assert_eq!(snapshot.events_received, 0);
        assert_eq!(snapshot.events_sent, 0);
        assert_eq!(snapshot.send_failures, 0);
        assert_eq!(snapshot.in_flight(), 0);
    }

    #[test]
    fn test_in_flight() {
        let diag = Diagnostics::new();
        for _ in 0..5 {
            diag.increment_received();
            diag.increment_enqueued();
        }
        diag.increment_sent(10);
        diag.increment_send_failure();

        let snapshot = diag.snapshot();
        assert_eq!(snapshot.in_flight(), 3);
        assert_eq!(snapshot.sent_bytes, 10);
    }

    #[test]
    fn test_add_send_failures() {
        let diag = Diagnostics::new();
        diag.add_send_failures(0);
        diag.add_send_failures(4);
        assert_eq!(diag.snapshot().send_failures, 4);
    }

    #[test]
    fn test_concurrent_increments() {
        let diag = Arc::new(Diagnostics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let diag = Arc::clone(&diag);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        diag.increment_received();
                        diag.increment_sent(1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = diag.snapshot();
        assert_eq!(snapshot.events_received, 8000);
        assert_eq!(snapshot.events_sent, 8000);
        assert_eq!(snapshot.sent_bytes, 8000);
    }

    #[test]
    fn test_snapshot_display() {
        let diag = Diagnostics::new();
        diag.increment_received();
        let text = diag.snapshot().to_string();
        assert!(text.contains("received=1"));
        assert!(text.contains("failures=0"));
    }
}
