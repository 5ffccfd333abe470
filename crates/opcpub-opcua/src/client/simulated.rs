// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process simulated device server.
//!
//! Serves two kinds of nodes:
//!
//! - ids containing `CurrentTime` publish the wall clock once per sampling
//!   interval, starting on registration
//! - every other id publishes one initial value on registration and then
//!   stays static
//!
//! Endpoints can be made unreachable and live sessions can be dropped, which
//! exercises the registry's reconnect path without a real device.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use opcpub_core::error::{ConnectionError, ConnectionResult, RegistrationError, RegistrationResult};
use opcpub_core::types::{DataValue, ItemId, Notification};

use super::transport::{
    DeviceSession, DeviceTransport, ItemHandle, ItemRegistration, SessionEvent, SessionHandle,
    SubscriptionHandle,
};

const EVENT_CAPACITY: usize = 1024;
const CURRENT_TIME_MARKER: &str = "CurrentTime";

struct SimulatedSession {
    endpoint: String,
    events: mpsc::Sender<SessionEvent>,
    subscriptions: Mutex<HashSet<SubscriptionHandle>>,
    generators: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulatedSession {
    fn stop(&self) {
        for generator in self.generators.lock().drain(..) {
            generator.abort();
        }
    }
}

/// A [`DeviceTransport`] backed by in-process value generators.
#[derive(Default)]
pub struct SimulatedTransport {
    sessions: DashMap<SessionHandle, SimulatedSession>,
    unreachable: Mutex<HashSet<String>>,
    next_session: AtomicU64,
    next_subscription: AtomicU32,
    next_item: AtomicU32,
}

impl SimulatedTransport {
    /// Creates a transport with every endpoint reachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes connects to `endpoint` fail until cleared.
    pub fn set_unreachable(&self, endpoint: &str, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(endpoint.to_string());
        } else {
            set.remove(endpoint);
        }
    }

    /// Drops every live session to `endpoint`, reporting `reason` on each.
    ///
    /// Returns the number of sessions dropped.
    pub async fn disconnect(&self, endpoint: &str, reason: &str) -> usize {
        let handles: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().endpoint == endpoint)
            .map(|entry| *entry.key())
            .collect();

        for handle in &handles {
            if let Some((_, session)) = self.sessions.remove(handle) {
                session.stop();
                let _ = session
                    .events
                    .send(SessionEvent::Disconnected {
                        reason: reason.to_string(),
                    })
                    .await;
            }
        }

        if !handles.is_empty() {
            info!(endpoint = endpoint, sessions = handles.len(), reason = reason, "Simulated disconnect");
        }
        handles.len()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn initial_value(item_id: &ItemId) -> DataValue {
        DataValue::String(format!("{} (simulated)", item_id))
    }
}

#[async_trait]
impl DeviceTransport for SimulatedTransport {
    async fn connect(&self, endpoint: &str) -> ConnectionResult<DeviceSession> {
        if self.unreachable.lock().contains(endpoint) {
            return Err(ConnectionError::failed(endpoint, "endpoint unreachable"));
        }

        let handle = SessionHandle(self.next_session.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, events) = mpsc::channel(EVENT_CAPACITY);
        self.sessions.insert(
            handle,
            SimulatedSession {
                endpoint: endpoint.to_string(),
                events: tx,
                subscriptions: Mutex::new(HashSet::new()),
                generators: Mutex::new(Vec::new()),
            },
        );

        debug!(endpoint = endpoint, session = %handle, "Simulated session opened");
        Ok(DeviceSession { handle, events })
    }

    async fn create_subscription(
        &self,
        session: SessionHandle,
        publishing_interval: Duration,
    ) -> RegistrationResult<SubscriptionHandle> {
        let entry = self
            .sessions
            .get(&session)
            .ok_or(RegistrationError::NotConnected)?;
        if publishing_interval.is_zero() {
            return Err(RegistrationError::subscription_failed(
                publishing_interval,
                "publishing interval must be positive",
            ));
        }

        let handle = SubscriptionHandle(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        entry.subscriptions.lock().insert(handle);
        Ok(handle)
    }

    async fn register_item(
        &self,
        session: SessionHandle,
        subscription: SubscriptionHandle,
        item: &ItemRegistration,
    ) -> RegistrationResult<ItemHandle> {
        let entry = self
            .sessions
            .get(&session)
            .ok_or(RegistrationError::NotConnected)?;
        if !entry.subscriptions.lock().contains(&subscription) {
            return Err(RegistrationError::item_failed(
                item.descriptor.item_id.as_str(),
                format!("unknown subscription {}", subscription),
            ));
        }

        let events = entry.events.clone();
        let client_handle = item.client_handle;
        let item_id = item.descriptor.item_id.clone();

        let generator = if item_id.as_str().contains(CURRENT_TIME_MARKER) {
            let period = item.descriptor.sampling_interval.max(Duration::from_millis(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    let notification =
                        Notification::new(client_handle, item_id.clone(), DataValue::DateTime(Utc::now()));
                    if events.send(SessionEvent::Notification(notification)).await.is_err() {
                        break;
                    }
                }
            })
        } else {
            tokio::spawn(async move {
                let value = SimulatedTransport::initial_value(&item_id);
                let notification = Notification::new(client_handle, item_id, value);
                let _ = events.send(SessionEvent::Notification(notification)).await;
            })
        };
        entry.generators.lock().push(generator);

        Ok(ItemHandle(self.next_item.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn close(&self, session: SessionHandle) -> ConnectionResult<()> {
        if let Some((_, session)) = self.sessions.remove(&session) {
            session.stop();
            debug!(endpoint = %session.endpoint, "Simulated session closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl std::fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use opcpub_core::types::{ClientHandle, ItemDescriptor};

    fn registration(handle: u32, id: &str, sampling: Duration) -> ItemRegistration {
        ItemRegistration {
            client_handle: ClientHandle(handle),
            descriptor: ItemDescriptor::new(id).with_sampling_interval(sampling),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_time_node_ticks() {
        let transport = SimulatedTransport::new();
        let mut session = transport.connect("opc.tcp://sim:50000").await.unwrap();
        let sub = transport
            .create_subscription(session.handle, Duration::from_secs(1))
            .await
            .unwrap();
        transport
            .register_item(
                session.handle,
                sub,
                &registration(1, "i=2258;CurrentTime", Duration::from_millis(500)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1250)).await;

        let mut count = 0;
        while let Ok(event) = session.events.try_recv() {
            assert!(matches!(event, SessionEvent::Notification(ref n) if n.client_handle == ClientHandle(1)));
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_node_sends_once() {
        let transport = SimulatedTransport::new();
        let mut session = transport.connect("opc.tcp://sim:50000").await.unwrap();
        let sub = transport
            .create_subscription(session.handle, Duration::from_secs(1))
            .await
            .unwrap();
        transport
            .register_item(
                session.handle,
                sub,
                &registration(7, "ns=2;s=ProductName", Duration::from_millis(100)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        let event = session.events.try_recv().unwrap();
        match event {
            SessionEvent::Notification(n) => {
                assert_eq!(n.item_id.as_str(), "ns=2;s=ProductName");
                assert!(n.value.as_str().is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(session.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_reports_reason() {
        let transport = SimulatedTransport::new();
        let mut session = transport.connect("opc.tcp://sim:50000").await.unwrap();

        assert_eq!(transport.disconnect("opc.tcp://sim:50000", "maintenance").await, 1);
        assert_eq!(transport.session_count(), 0);
        assert_eq!(
            session.events.recv().await,
            Some(SessionEvent::Disconnected {
                reason: "maintenance".to_string()
            })
        );
        assert_eq!(session.events.recv().await, None);
    }

    #[tokio::test]
    async fn test_unreachable_and_unknown_session() {
        let transport = SimulatedTransport::new();
        transport.set_unreachable("opc.tcp://down:4840", true);
        assert!(transport.connect("opc.tcp://down:4840").await.is_err());

        let result = transport
            .create_subscription(SessionHandle(42), Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(RegistrationError::NotConnected));

        transport.set_unreachable("opc.tcp://down:4840", false);
        assert!(transport.connect("opc.tcp://down:4840").await.is_ok());
    }
}
