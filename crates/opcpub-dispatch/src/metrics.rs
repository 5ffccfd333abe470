// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Prometheus metrics for outbound dispatch.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `opcpub_dispatch_sends_total` | Counter | Messages accepted by the outbound transport |
//! | `opcpub_dispatch_send_errors_total` | Counter | Failed send attempts by error type |
//! | `opcpub_dispatch_dropped_total` | Counter | Messages dropped after exhausting retries |
//! | `opcpub_dispatch_retries_total` | Counter | Send retries scheduled |
//! | `opcpub_dispatch_send_duration_seconds` | Histogram | Outbound send latency |
//! | `opcpub_dispatch_queue_depth` | Gauge | Messages queued or in flight |
//! | `opcpub_events_received` | Gauge | Diagnostics: raw notifications received |
//! | `opcpub_events_sent` | Gauge | Diagnostics: messages sent |
//! | `opcpub_send_failures` | Gauge | Diagnostics: messages dropped |
//! | `opcpub_sessions` | Gauge | Sessions by `state` (`configured`, `connected`) |
//! | `opcpub_items` | Gauge | Monitored items by `state` (`configured`, `monitored`) |
//!
//! The diagnostics gauges mirror a [`DiagnosticsSnapshot`]; they are set by
//! [`DispatchMetricsCollector::observe_snapshot`] and are process-wide even
//! when several publisher contexts run in one process.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, TextEncoder,
};

use opcpub_core::diagnostics::DiagnosticsSnapshot;

// =============================================================================
// Metric Definitions
// =============================================================================

static SENDS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "opcpub_dispatch_sends_total",
        "Total number of messages accepted by the outbound transport"
    )
    .expect("Failed to register sends_total metric")
});

static SEND_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opcpub_dispatch_send_errors_total",
        "Total number of failed send attempts by error type",
        &["error_type"]
    )
    .expect("Failed to register send_errors metric")
});

static DROPPED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "opcpub_dispatch_dropped_total",
        "Total number of messages dropped after exhausting send attempts"
    )
    .expect("Failed to register dropped_total metric")
});

static RETRIES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "opcpub_dispatch_retries_total",
        "Total number of send retries scheduled"
    )
    .expect("Failed to register retries_total metric")
});

static SEND_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "opcpub_dispatch_send_duration_seconds",
        "Duration of outbound send calls in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register send_duration metric")
});

static QUEUE_DEPTH: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "opcpub_dispatch_queue_depth",
        "Messages queued for dispatch or in flight"
    )
    .expect("Failed to register queue_depth metric")
});

static EVENTS_RECEIVED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "opcpub_events_received",
        "Raw notifications received from device sessions"
    )
    .expect("Failed to register events_received metric")
});

static EVENTS_SENT: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "opcpub_events_sent",
        "Messages acknowledged by the outbound transport"
    )
    .expect("Failed to register events_sent metric")
});

static SEND_FAILURES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "opcpub_send_failures",
        "Messages dropped after failing to send"
    )
    .expect("Failed to register send_failures metric")
});

static SESSIONS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("opcpub_sessions", "Device sessions by state", &["state"])
        .expect("Failed to register sessions metric")
});

static ITEMS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("opcpub_items", "Monitored items by state", &["state"])
        .expect("Failed to register items metric")
});

// =============================================================================
// Metrics Collector
// =============================================================================

/// Records dispatch metrics into the default Prometheus registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchMetricsCollector {
    enabled: bool,
}

impl DispatchMetricsCollector {
    /// Creates a new metrics collector.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Creates a disabled metrics collector (no-op).
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Returns whether metrics collection is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records a successful send.
    pub fn record_send(&self, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        SENDS_TOTAL.inc();
        SEND_DURATION.observe(duration_secs);
    }

    /// Records a failed send attempt.
    pub fn record_send_error(&self, error_type: &str) {
        if !self.enabled {
            return;
        }
        SEND_ERRORS.with_label_values(&[error_type]).inc();
    }

    /// Records a scheduled retry.
    pub fn record_retry(&self) {
        if !self.enabled {
            return;
        }
        RETRIES_TOTAL.inc();
    }

    /// Records dropped messages.
    pub fn record_dropped(&self, count: u64) {
        if !self.enabled || count == 0 {
            return;
        }
        DROPPED_TOTAL.inc_by(count as f64);
    }

    /// Updates the queue depth gauge.
    pub fn set_queue_depth(&self, depth: u64) {
        if !self.enabled {
            return;
        }
        QUEUE_DEPTH.set(depth as f64);
    }

    /// Mirrors a diagnostics snapshot into gauges.
    pub fn observe_snapshot(&self, snapshot: &DiagnosticsSnapshot) {
        if !self.enabled {
            return;
        }
        EVENTS_RECEIVED.set(snapshot.events_received as f64);
        EVENTS_SENT.set(snapshot.events_sent as f64);
        SEND_FAILURES.set(snapshot.send_failures as f64);
    }

    /// Mirrors configured versus live registry counts into gauges.
    pub fn observe_registry(
        &self,
        sessions_configured: usize,
        sessions_connected: usize,
        items_configured: usize,
        items_monitored: usize,
    ) {
        if !self.enabled {
            return;
        }
        SESSIONS.with_label_values(&["configured"]).set(sessions_configured as f64);
        SESSIONS.with_label_values(&["connected"]).set(sessions_connected as f64);
        ITEMS.with_label_values(&["configured"]).set(items_configured as f64);
        ITEMS.with_label_values(&["monitored"]).set(items_monitored as f64);
    }
}

/// Renders the default registry in Prometheus text exposition format.
pub fn render_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
