// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device session lifecycle.
//!
//! A [`Session`] is one endpoint of the configured graph. It is created at
//! configuration load and outlives any number of transport sessions: each
//! successful connect attaches a fresh [`SessionHandle`] and event stream,
//! each fault detaches them.
//!
//! Connecting is serialized by a gate. A caller that arrives while an
//! attempt is in flight waits for it and receives that attempt's outcome
//! instead of starting a second one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use opcpub_core::error::{ConnectionError, ConnectionResult};

use super::subscription::Subscription;
use super::transport::{DeviceTransport, SessionEvent, SessionHandle, SessionStatus};

/// One configured device endpoint and its subscriptions.
pub struct Session {
    endpoint: Arc<str>,
    subscriptions: Vec<Arc<Subscription>>,
    status: RwLock<SessionStatus>,
    handle: Mutex<Option<SessionHandle>>,
    events: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    connect_gate: tokio::sync::Mutex<()>,
    completed_attempts: AtomicU64,
    last_outcome: Mutex<Option<ConnectionResult<()>>>,
    connects: AtomicU64,
}

impl Session {
    /// Creates a disconnected session.
    pub fn new(endpoint: Arc<str>, subscriptions: Vec<Arc<Subscription>>) -> Self {
        Self {
            endpoint,
            subscriptions,
            status: RwLock::new(SessionStatus::Disconnected),
            handle: Mutex::new(None),
            events: Mutex::new(None),
            connect_gate: tokio::sync::Mutex::new(()),
            completed_attempts: AtomicU64::new(0),
            last_outcome: Mutex::new(None),
            connects: AtomicU64::new(0),
        }
    }

    /// Endpoint URL.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Subscriptions in configuration order.
    #[inline]
    pub fn subscriptions(&self) -> &[Arc<Subscription>] {
        &self.subscriptions
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Returns `true` if connected.
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Transport handle of the live session.
    pub fn handle(&self) -> Option<SessionHandle> {
        *self.handle.lock()
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of items across all subscriptions.
    pub fn item_count(&self) -> usize {
        self.subscriptions.iter().map(|s| s.items().len()).sum()
    }

    fn set_status(&self, status: SessionStatus) {
        let previous = std::mem::replace(&mut *self.status.write(), status);
        if previous != status {
            debug!(endpoint = %self.endpoint, from = %previous, to = %status, "Session status changed");
        }
    }

    /// Opens the transport session. Idempotent.
    ///
    /// Returns immediately when already connected. A caller that waited on
    /// an in-flight attempt gets that attempt's outcome.
    pub async fn connect(
        &self,
        transport: &dyn DeviceTransport,
        timeout: Duration,
    ) -> ConnectionResult<()> {
        let observed = self.completed_attempts.load(Ordering::SeqCst);
        let _gate = self.connect_gate.lock().await;

        if self.is_connected() {
            return Ok(());
        }
        if self.completed_attempts.load(Ordering::SeqCst) != observed {
            if let Some(outcome) = self.last_outcome.lock().clone() {
                return outcome;
            }
        }

        self.set_status(SessionStatus::Connecting);
        let result = match tokio::time::timeout(timeout, transport.connect(&self.endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::timeout(&*self.endpoint, timeout)),
        };

        let outcome = match result {
            Ok(device) => {
                *self.handle.lock() = Some(device.handle);
                *self.events.lock() = Some(device.events);
                self.connects.fetch_add(1, Ordering::SeqCst);
                self.set_status(SessionStatus::Connected);
                info!(endpoint = %self.endpoint, session = %device.handle, "Session connected");
                Ok(())
            }
            Err(e) => {
                self.set_status(SessionStatus::Faulted);
                warn!(endpoint = %self.endpoint, error = %e, "Session connect failed");
                Err(e)
            }
        };

        *self.last_outcome.lock() = Some(outcome.clone());
        self.completed_attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Takes the event stream of the live session. Returns `None` once taken.
    pub(crate) fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events.lock().take()
    }

    /// Detaches the live transport session and marks the session Faulted.
    ///
    /// Returns the detached handle so the caller can close it.
    pub(crate) fn mark_faulted(&self) -> Option<SessionHandle> {
        self.events.lock().take();
        for subscription in &self.subscriptions {
            subscription.clear_handle();
        }
        self.set_status(SessionStatus::Faulted);
        self.handle.lock().take()
    }

    /// Closes the transport session and marks the session Disconnected.
    pub async fn close(&self, transport: &dyn DeviceTransport) {
        let _gate = self.connect_gate.lock().await;

        self.events.lock().take();
        for subscription in &self.subscriptions {
            subscription.clear_handle();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = transport.close(handle).await {
                debug!(endpoint = %self.endpoint, error = %e, "Session close failed");
            }
        }
        self.set_status(SessionStatus::Disconnected);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{DeviceSession, ItemHandle, ItemRegistration, SubscriptionHandle};
    use async_trait::async_trait;
    use opcpub_core::error::RegistrationResult;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct SlowTransport {
        connects: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl DeviceTransport for SlowTransport {
        async fn connect(&self, endpoint: &str) -> ConnectionResult<DeviceSession> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail {
                return Err(ConnectionError::failed(endpoint, "refused"));
            }
            let (_tx, events) = mpsc::channel(1);
            Ok(DeviceSession {
                handle: SessionHandle(1),
                events,
            })
        }

        async fn create_subscription(
            &self,
            _session: SessionHandle,
            _publishing_interval: Duration,
        ) -> RegistrationResult<SubscriptionHandle> {
            Ok(SubscriptionHandle(1))
        }

        async fn register_item(
            &self,
            _session: SessionHandle,
            _subscription: SubscriptionHandle,
            _item: &ItemRegistration,
        ) -> RegistrationResult<ItemHandle> {
            Ok(ItemHandle(1))
        }

        async fn close(&self, _session: SessionHandle) -> ConnectionResult<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn session() -> Arc<Session> {
        Arc::new(Session::new(Arc::from("opc.tcp://plc:50000"), Vec::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_single_attempt() {
        let transport = Arc::new(SlowTransport::default());
        let session = session();

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let session = Arc::clone(&session);
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    session.connect(transport.as_ref(), Duration::from_secs(5)).await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(session.status(), SessionStatus::Connected);
        assert_eq!(session.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_share_failure() {
        let transport = Arc::new(SlowTransport {
            fail: true,
            ..Default::default()
        });
        let session = session();

        let first = {
            let session = Arc::clone(&session);
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { session.connect(transport.as_ref(), Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        let second = session.connect(transport.as_ref(), Duration::from_secs(5)).await;

        assert!(first.await.unwrap().is_err());
        assert!(matches!(second, Err(ConnectionError::Failed { .. })));
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(session.status(), SessionStatus::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let transport = SlowTransport::default();
        let session = session();

        let result = session.connect(&transport, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ConnectionError::Timeout { .. })));
        assert!(session.status().is_faulted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_and_close() {
        let transport = SlowTransport::default();
        let session = session();
        session.connect(&transport, Duration::from_secs(5)).await.unwrap();
        assert!(session.take_events().is_some());
        assert!(session.take_events().is_none());

        assert_eq!(session.mark_faulted(), Some(SessionHandle(1)));
        assert!(session.handle().is_none());

        session.connect(&transport, Duration::from_secs(5)).await.unwrap();
        session.close(&transport).await;
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert_eq!(session.connect_count(), 2);
    }
}
