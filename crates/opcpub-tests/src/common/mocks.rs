// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! [`FakeDeviceTransport`] stands in for a device server. Tests push values
//! for registered items, script connect and registration failures, and drop
//! sessions. Every interaction is recorded for later assertions.
//!
//! The outbound side uses [`RecordingOutboundTransport`] from
//! `opcpub-dispatch`, re-exported here.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use opcpub_core::error::{ConnectionError, ConnectionResult, RegistrationError, RegistrationResult};
use opcpub_core::types::{ClientHandle, DataValue, ItemId, Notification};
use opcpub_opcua::client::transport::ItemHandle;
use opcpub_opcua::{DeviceSession, DeviceTransport, ItemRegistration, SessionEvent, SessionHandle, SubscriptionHandle};

pub use opcpub_dispatch::RecordingOutboundTransport;

const EVENT_CAPACITY: usize = 1024;

/// One item registration seen by the fake transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRegistration {
    /// Endpoint of the owning session.
    pub endpoint: String,
    /// Session the item was registered on.
    pub session: SessionHandle,
    /// Subscription the item was registered on.
    pub subscription: SubscriptionHandle,
    /// Handle echoed on notifications.
    pub client_handle: ClientHandle,
    /// Item identifier.
    pub item_id: ItemId,
}

struct FakeSession {
    endpoint: String,
    events: mpsc::Sender<SessionEvent>,
    subscriptions: HashSet<SubscriptionHandle>,
    items: Vec<(ClientHandle, ItemId)>,
}

// =============================================================================
// FakeDeviceTransport
// =============================================================================

/// A scriptable in-memory [`DeviceTransport`].
#[derive(Default)]
pub struct FakeDeviceTransport {
    sessions: DashMap<SessionHandle, FakeSession>,
    connect_failures: Mutex<HashMap<String, u32>>,
    unreachable: Mutex<HashSet<String>>,
    failing_items: Mutex<HashSet<String>>,
    initial_values: Mutex<HashMap<String, DataValue>>,
    registrations: Mutex<Vec<RecordedRegistration>>,
    connect_latency_ms: AtomicU64,
    connects: AtomicU64,
    closes: AtomicU64,
    next_session: AtomicU64,
    next_subscription: AtomicU32,
    next_item: AtomicU32,
}

impl FakeDeviceTransport {
    /// Creates a transport where every endpoint is reachable.
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Scripting
    // -------------------------------------------------------------------------

    /// Fails the next `count` connects to `endpoint`.
    pub fn fail_connects(&self, endpoint: &str, count: u32) {
        self.connect_failures.lock().insert(endpoint.to_string(), count);
    }

    /// Makes every connect to `endpoint` fail until cleared.
    pub fn set_unreachable(&self, endpoint: &str, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(endpoint.to_string());
        } else {
            set.remove(endpoint);
        }
    }

    /// Makes registration of `item_id` fail until cleared.
    pub fn fail_item(&self, item_id: &str, fail: bool) {
        let mut set = self.failing_items.lock();
        if fail {
            set.insert(item_id.to_string());
        } else {
            set.remove(item_id);
        }
    }

    /// Delays every connect by `latency`.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Reports `value` once whenever `item_id` gets registered, like a
    /// server delivering the initial value of a static node.
    pub fn set_initial_value(&self, item_id: &str, value: DataValue) {
        self.initial_values.lock().insert(item_id.to_string(), value);
    }

    // -------------------------------------------------------------------------
    // Device behaviour
    // -------------------------------------------------------------------------

    /// Delivers a notification for `item_id` on every live session to
    /// `endpoint` where the item is registered.
    ///
    /// Returns the number of notifications delivered.
    pub async fn push(&self, endpoint: &str, item_id: &str, value: DataValue) -> usize {
        let targets: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.endpoint == endpoint)
            .flat_map(|entry| {
                let events = entry.events.clone();
                entry
                    .items
                    .iter()
                    .filter(|(_, id)| id.as_str() == item_id)
                    .map(move |(handle, id)| (events.clone(), *handle, id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut delivered = 0;
        for (events, handle, id) in targets {
            let notification =
                Notification::new(handle, id, value.clone()).with_source_timestamp(Utc::now());
            if events.send(SessionEvent::Notification(notification)).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Delivers a raw notification with an arbitrary client handle on every
    /// live session to `endpoint`.
    pub async fn push_raw(&self, endpoint: &str, notification: Notification) -> usize {
        let senders: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.endpoint == endpoint)
            .map(|entry| entry.events.clone())
            .collect();

        let mut delivered = 0;
        for events in senders {
            if events
                .send(SessionEvent::Notification(notification.clone()))
                .await
                .is_ok()
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drops every live session to `endpoint` with a disconnect event.
    pub async fn disconnect(&self, endpoint: &str, reason: &str) -> usize {
        let handles = self.handles_for(endpoint);
        for handle in &handles {
            if let Some((_, session)) = self.sessions.remove(handle) {
                let _ = session
                    .events
                    .send(SessionEvent::Disconnected {
                        reason: reason.to_string(),
                    })
                    .await;
            }
        }
        handles.len()
    }

    /// Drops every live session to `endpoint` by ending its event stream.
    pub fn end_stream(&self, endpoint: &str) -> usize {
        let handles = self.handles_for(endpoint);
        for handle in &handles {
            self.sessions.remove(handle);
        }
        handles.len()
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Number of connect calls, failed ones included.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of close calls.
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Every successful item registration, in order.
    pub fn registrations(&self) -> Vec<RecordedRegistration> {
        self.registrations.lock().clone()
    }

    /// Number of successful registrations of `item_id`.
    pub fn registration_count(&self, item_id: &str) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|r| r.item_id.as_str() == item_id)
            .count()
    }

    fn handles_for(&self, endpoint: &str) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .filter(|entry| entry.endpoint == endpoint)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[async_trait]
impl DeviceTransport for FakeDeviceTransport {
    async fn connect(&self, endpoint: &str) -> ConnectionResult<DeviceSession> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let latency = self.connect_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.unreachable.lock().contains(endpoint) {
            return Err(ConnectionError::failed(endpoint, "endpoint unreachable"));
        }
        {
            let mut failures = self.connect_failures.lock();
            if let Some(remaining) = failures.get_mut(endpoint) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ConnectionError::failed(endpoint, "scripted connect failure"));
                }
            }
        }

        let handle = SessionHandle(self.next_session.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, events) = mpsc::channel(EVENT_CAPACITY);
        self.sessions.insert(
            handle,
            FakeSession {
                endpoint: endpoint.to_string(),
                events: tx,
                subscriptions: HashSet::new(),
                items: Vec::new(),
            },
        );
        Ok(DeviceSession { handle, events })
    }

    async fn create_subscription(
        &self,
        session: SessionHandle,
        publishing_interval: Duration,
    ) -> RegistrationResult<SubscriptionHandle> {
        let mut entry = self
            .sessions
            .get_mut(&session)
            .ok_or(RegistrationError::NotConnected)?;
        if publishing_interval.is_zero() {
            return Err(RegistrationError::subscription_failed(
                publishing_interval,
                "publishing interval must be positive",
            ));
        }
        let handle = SubscriptionHandle(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        entry.subscriptions.insert(handle);
        Ok(handle)
    }

    async fn register_item(
        &self,
        session: SessionHandle,
        subscription: SubscriptionHandle,
        item: &ItemRegistration,
    ) -> RegistrationResult<ItemHandle> {
        let item_id = item.descriptor.item_id.clone();
        if self.failing_items.lock().contains(item_id.as_str()) {
            return Err(RegistrationError::item_failed(item_id.as_str(), "scripted registration failure"));
        }

        let (endpoint, events) = {
            let mut entry = self
                .sessions
                .get_mut(&session)
                .ok_or(RegistrationError::NotConnected)?;
            if !entry.subscriptions.contains(&subscription) {
                return Err(RegistrationError::item_failed(
                    item_id.as_str(),
                    format!("unknown subscription {}", subscription),
                ));
            }
            entry.items.push((item.client_handle, item_id.clone()));
            (entry.endpoint.clone(), entry.events.clone())
        };

        self.registrations.lock().push(RecordedRegistration {
            endpoint,
            session,
            subscription,
            client_handle: item.client_handle,
            item_id: item_id.clone(),
        });

        let initial = self.initial_values.lock().get(item_id.as_str()).cloned();
        if let Some(value) = initial {
            let notification = Notification::new(item.client_handle, item_id, value);
            let _ = events.try_send(SessionEvent::Notification(notification));
        }

        Ok(ItemHandle(self.next_item.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn close(&self, session: SessionHandle) -> ConnectionResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.sessions.remove(&session);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

impl std::fmt::Debug for FakeDeviceTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDeviceTransport")
            .field("sessions", &self.sessions.len())
            .field("connects", &self.connect_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
