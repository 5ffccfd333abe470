// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device session management and telemetry shaping for opcpub.
//!
//! This crate turns a static list of node descriptors into supervised device
//! sessions and shapes their notifications into outbound messages.
//!
//! # Features
//!
//! - Per-endpoint session supervision with exponential-backoff reconnect
//! - Subscription and monitored item registration from retained configuration
//! - Skip-first and heartbeat shaping per item
//! - One shared heartbeat timer for all items
//! - A simulated device transport for local runs and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use opcpub_opcua::{PublisherContext, SimulatedTransport};
//!
//! let context = PublisherContext::builder()
//!     .device_transport(Arc::new(SimulatedTransport::new()))
//!     .outbound_transport(outbound)
//!     .build()
//!     .await?;
//!
//! context.load_configuration(descriptors).await?;
//! let report = context.start().await;
//! println!("connected: {:?}", report.connected);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod context;
pub mod registry;

pub use client::{
    DeviceSession, DeviceTransport, EmitDecision, HeartbeatScheduler, ItemRegistration, ItemState,
    MonitoredItem, NotificationPipeline, Session, SessionEvent, SessionHandle, SessionStatus,
    SimulatedTransport, Subscription, SubscriptionHandle,
};
pub use context::{PublisherContext, PublisherContextBuilder, DEFAULT_PRODUCT_INFO};
pub use registry::{Registry, RegistrySettings, RegistryStatus, StartReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
