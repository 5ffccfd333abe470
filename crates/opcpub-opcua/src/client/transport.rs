// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device transport abstraction layer.
//!
//! The registry never talks to a device stack directly. It connects, creates
//! subscriptions, registers items and closes sessions through
//! [`DeviceTransport`], and consumes each session's notifications from the
//! [`SessionEvent`] stream returned by `connect`.
//!
//! Two implementations ship with the workspace: [`SimulatedTransport`] for
//! running the publisher without hardware, and the fake transport in the
//! integration test crate.
//!
//! [`SimulatedTransport`]: super::simulated::SimulatedTransport

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use opcpub_core::error::{ConnectionResult, RegistrationResult};
use opcpub_core::types::{ClientHandle, ItemDescriptor, Notification};

// =============================================================================
// Handles
// =============================================================================

/// Transport-assigned identifier of an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Transport-assigned identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u32);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Transport-assigned identifier of a registered monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemHandle(pub u32);

impl fmt::Display for ItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

// =============================================================================
// Session events
// =============================================================================

/// Asynchronous events delivered on a session's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A data-change notification for a registered item.
    Notification(Notification),
    /// The transport lost the session.
    Disconnected {
        /// Reason reported by the transport.
        reason: String,
    },
}

/// An open session returned by [`DeviceTransport::connect`].
///
/// Dropping `events` does not close the session; call
/// [`DeviceTransport::close`] with `handle`.
#[derive(Debug)]
pub struct DeviceSession {
    /// Session handle for subsequent calls.
    pub handle: SessionHandle,
    /// Ordered notification stream of this session.
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Item registration request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRegistration {
    /// Handle the transport must echo on every notification.
    pub client_handle: ClientHandle,
    /// Configured item.
    pub descriptor: ItemDescriptor,
}

// =============================================================================
// DeviceTransport
// =============================================================================

/// Session/subscription based device protocol client.
///
/// Implementations must deliver notifications of one item in order on the
/// session's event stream. A transport that loses a session either sends
/// [`SessionEvent::Disconnected`] or closes the stream.
#[async_trait]
pub trait DeviceTransport: Send + Sync + 'static {
    /// Opens a session to `endpoint`.
    async fn connect(&self, endpoint: &str) -> ConnectionResult<DeviceSession>;

    /// Creates a subscription on an open session.
    async fn create_subscription(
        &self,
        session: SessionHandle,
        publishing_interval: Duration,
    ) -> RegistrationResult<SubscriptionHandle>;

    /// Registers a monitored item on a subscription.
    async fn register_item(
        &self,
        session: SessionHandle,
        subscription: SubscriptionHandle,
        item: &ItemRegistration,
    ) -> RegistrationResult<ItemHandle>;

    /// Closes a session. Closing an unknown or already closed session succeeds.
    async fn close(&self, session: SessionHandle) -> ConnectionResult<()>;

    /// Returns a short name for logging.
    fn name(&self) -> &str;
}

// =============================================================================
// SessionStatus
// =============================================================================

/// Connection status of a registry session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected, subscriptions created.
    Connected,
    /// Lost or failed; a reconnect is pending.
    Faulted,
}

impl SessionStatus {
    /// Returns `true` if connected.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if faulted.
    #[inline]
    pub const fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}
