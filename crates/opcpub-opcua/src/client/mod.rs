// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device-side client building blocks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Session / Subscription                       │
//! │             (configured graph, connect lifecycle)               │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          MonitoredItem  ◀──ticks──  HeartbeatScheduler          │
//! │              (per-item emit decisions)                          │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   NotificationPipeline                          │
//! │              (routing, message construction)                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │ SessionEvent
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     DeviceTransport                             │
//! │        (abstract transport; SimulatedTransport ships here)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod heartbeat;
pub mod item;
pub mod pipeline;
pub mod session;
pub mod simulated;
pub mod subscription;
pub mod transport;

pub use heartbeat::{HeartbeatScheduler, HeartbeatTick, HeartbeatToken};
pub use item::{EmitDecision, Emission, ItemState, MonitoredItem, SuppressReason};
pub use pipeline::NotificationPipeline;
pub use session::Session;
pub use simulated::SimulatedTransport;
pub use subscription::Subscription;
pub use transport::{
    DeviceSession, DeviceTransport, ItemHandle, ItemRegistration, SessionEvent, SessionHandle,
    SessionStatus, SubscriptionHandle,
};
