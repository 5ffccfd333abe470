// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitored item state machine.
//!
//! ```text
//!   Unregistered ──on_registered──▶ Registered ──on_faulted──▶ Faulted
//!        ▲                            │   ▲                        │
//!        │                            │   └──────on_registered─────┘
//!        └───────on_unregistered──────┴──────────────────────────────
//! ```
//!
//! All runtime state sits behind one mutex per item, so the data-change path
//! and the heartbeat path never mutate the same item concurrently. The
//! heartbeat token is held under the same lock: once `on_unregistered` or
//! `on_faulted` returns, every later tick for the old registration is refused.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use opcpub_core::types::{ClientHandle, DataValue, EmitReason, ItemDescriptor, ItemId};

use super::heartbeat::{HeartbeatScheduler, HeartbeatToken};

// =============================================================================
// ItemState
// =============================================================================

/// Registration state of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Not registered with a device session.
    #[default]
    Unregistered,
    /// Registered and receiving notifications.
    Registered,
    /// Owning session lost; waiting for reconnect.
    Faulted,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unregistered => write!(f, "Unregistered"),
            Self::Registered => write!(f, "Registered"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

// =============================================================================
// EmitDecision
// =============================================================================

/// What to emit, captured under the item lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// Why the message is emitted.
    pub reason: EmitReason,
    /// The value at construction time.
    pub value: DataValue,
    /// Source timestamp of `value`.
    pub source_timestamp: DateTime<Utc>,
}

/// Why nothing was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// First sample after registration with skip-first enabled.
    SkipFirst,
    /// The item is not registered.
    NotRegistered,
    /// Heartbeat tick before any value is known.
    NoValue,
    /// Heartbeat tick from a cancelled registration.
    StaleTick,
}

/// Result of feeding an event into the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitDecision {
    /// Produce one message.
    Emit(Emission),
    /// Produce nothing.
    Suppress(SuppressReason),
}

impl EmitDecision {
    /// Returns `true` if a message should be produced.
    #[inline]
    pub fn is_emit(&self) -> bool {
        matches!(self, EmitDecision::Emit(_))
    }
}

// =============================================================================
// MonitoredItem
// =============================================================================

#[derive(Debug, Default)]
struct ItemRuntime {
    state: ItemState,
    last_value: Option<(DataValue, DateTime<Utc>)>,
    last_emit_time: Option<DateTime<Utc>>,
    first_sample_consumed: bool,
    ever_registered: bool,
    heartbeat: Option<HeartbeatToken>,
    registrations: u64,
    last_error: Option<String>,
}

/// One configured data point and its runtime state.
#[derive(Debug)]
pub struct MonitoredItem {
    handle: ClientHandle,
    endpoint: Arc<str>,
    descriptor: ItemDescriptor,
    runtime: Mutex<ItemRuntime>,
}

impl MonitoredItem {
    /// Creates an unregistered item.
    pub fn new(handle: ClientHandle, endpoint: Arc<str>, descriptor: ItemDescriptor) -> Self {
        Self {
            handle,
            endpoint,
            descriptor,
            runtime: Mutex::new(ItemRuntime::default()),
        }
    }

    /// Client handle of the item.
    #[inline]
    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    /// Node identifier.
    #[inline]
    pub fn item_id(&self) -> &ItemId {
        &self.descriptor.item_id
    }

    /// Endpoint of the owning session.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Configured descriptor.
    #[inline]
    pub fn descriptor(&self) -> &ItemDescriptor {
        &self.descriptor
    }

    /// Current state.
    pub fn state(&self) -> ItemState {
        self.runtime.lock().state
    }

    /// Returns `true` if registered.
    pub fn is_registered(&self) -> bool {
        self.state() == ItemState::Registered
    }

    /// Last known value, if any.
    pub fn last_value(&self) -> Option<DataValue> {
        self.runtime.lock().last_value.as_ref().map(|(v, _)| v.clone())
    }

    /// Time of the last emission.
    pub fn last_emit_time(&self) -> Option<DateTime<Utc>> {
        self.runtime.lock().last_emit_time
    }

    /// Whether the first sample has been consumed.
    pub fn first_sample_consumed(&self) -> bool {
        self.runtime.lock().first_sample_consumed
    }

    /// Number of successful registrations so far.
    pub fn registrations(&self) -> u64 {
        self.runtime.lock().registrations
    }

    /// Last registration error, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.runtime.lock().last_error.clone()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Transition to Registered and start the heartbeat.
    ///
    /// `first_sample_consumed` is cleared on the first-ever registration; on
    /// re-registration it is kept unless `rearm_skip_first` is set. Calling
    /// this while already registered restarts the heartbeat period.
    pub fn on_registered(&self, scheduler: &HeartbeatScheduler, rearm_skip_first: bool) {
        let mut rt = self.runtime.lock();

        if let Some(token) = rt.heartbeat.take() {
            scheduler.cancel(self.handle, token);
        }

        if !rt.ever_registered || rearm_skip_first {
            rt.first_sample_consumed = false;
        }
        rt.ever_registered = true;
        rt.state = ItemState::Registered;
        rt.registrations += 1;
        rt.last_error = None;

        if self.descriptor.heartbeat_enabled() {
            rt.heartbeat = Some(scheduler.schedule(self.handle, self.descriptor.heartbeat_interval));
        }
    }

    /// Records a failed registration attempt; the item stays out of service.
    pub fn on_registration_failed(&self, scheduler: &HeartbeatScheduler, error: impl fmt::Display) {
        let mut rt = self.runtime.lock();
        if let Some(token) = rt.heartbeat.take() {
            scheduler.cancel(self.handle, token);
        }
        rt.state = ItemState::Unregistered;
        rt.last_error = Some(error.to_string());
    }

    /// Data-change decision function.
    pub fn on_notification(&self, value: DataValue, source_timestamp: DateTime<Utc>) -> EmitDecision {
        let mut rt = self.runtime.lock();

        if rt.state != ItemState::Registered {
            return EmitDecision::Suppress(SuppressReason::NotRegistered);
        }

        let skip = self.descriptor.skip_first && !rt.first_sample_consumed;
        rt.first_sample_consumed = true;
        rt.last_value = Some((value.clone(), source_timestamp));
        rt.last_emit_time = Some(Utc::now());

        if skip {
            EmitDecision::Suppress(SuppressReason::SkipFirst)
        } else {
            EmitDecision::Emit(Emission {
                reason: EmitReason::DataChange,
                value,
                source_timestamp,
            })
        }
    }

    /// Heartbeat decision function.
    ///
    /// Emits the last known value if `token` is the live registration.
    pub fn on_heartbeat_tick(&self, token: HeartbeatToken) -> EmitDecision {
        let mut rt = self.runtime.lock();

        if rt.state != ItemState::Registered {
            return EmitDecision::Suppress(SuppressReason::NotRegistered);
        }
        if rt.heartbeat != Some(token) {
            return EmitDecision::Suppress(SuppressReason::StaleTick);
        }
        let Some((value, source_timestamp)) = rt.last_value.clone() else {
            return EmitDecision::Suppress(SuppressReason::NoValue);
        };

        rt.last_emit_time = Some(Utc::now());
        EmitDecision::Emit(Emission {
            reason: EmitReason::Heartbeat,
            value,
            source_timestamp,
        })
    }

    /// Transition Registered → Faulted after the owning session is lost.
    pub fn on_faulted(&self, scheduler: &HeartbeatScheduler) {
        let mut rt = self.runtime.lock();
        if let Some(token) = rt.heartbeat.take() {
            scheduler.cancel(self.handle, token);
        }
        if rt.state == ItemState::Registered {
            rt.state = ItemState::Faulted;
        }
    }

    /// Transition to Unregistered. Idempotent.
    pub fn on_unregistered(&self, scheduler: &HeartbeatScheduler) {
        let mut rt = self.runtime.lock();
        if let Some(token) = rt.heartbeat.take() {
            scheduler.cancel(self.handle, token);
        }
        rt.state = ItemState::Unregistered;
    }
}

// =============================================================================
// Tests
// =============================================================================
