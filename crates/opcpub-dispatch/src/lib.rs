// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcpub-dispatch
//!
//! Delivers shaped telemetry messages to the cloud ingestion endpoint.
//!
//! - [`DispatchAdapter`]: bounded, per-item ordered queues with retry
//! - [`OutboundTransport`]: the send seam, with HTTP and recording implementations
//! - [`metrics`]: Prometheus counters and diagnostics gauges
//!
//! ## Example
//!
//! ```rust,ignore
//! use opcpub_dispatch::{DispatchAdapter, DispatchConfig, HttpOutboundTransport};
//!
//! let transport = Arc::new(HttpOutboundTransport::new(url, Duration::from_secs(30))?);
//! let adapter = DispatchAdapter::new(transport, DispatchConfig::default(), diagnostics, "OpcPublisher");
//! adapter.start().await;
//! adapter.send(message).await?;
//! adapter.shutdown().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod adapter;
pub mod metrics;
pub mod outbound;

pub use adapter::{DispatchAdapter, DispatchConfig, DispatchConfigBuilder};
pub use metrics::{render_text, DispatchMetricsCollector};
pub use outbound::{
    Ack, HttpOutboundTransport, OutboundTransport, RecordingOutboundTransport,
    PRODUCT_INFO_HEADER,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
