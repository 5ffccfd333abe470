// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node/session registry.
//!
//! The registry owns the configured session → subscription → item graph and
//! every task that serves it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Registry                                │
//! │                                                                      │
//! │  Graph (immutable, swapped on reload)                                │
//! │    Session ──▶ Subscription ──▶ MonitoredItem                        │
//! │                                                                      │
//! │  one supervisor per session:                                         │
//! │    connect ─▶ register ─▶ pump events ─▶ fault ─▶ backoff ─┐         │
//! │       ▲                                                    │         │
//! │       └────────────────────────────────────────────────────┘         │
//! │                                                                      │
//! │  HeartbeatScheduler ──ticks──▶ heartbeat worker ─┐                   │
//! │  session pumps ──notifications───────────────────┴─▶ Pipeline ─▶ Dispatch
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Faults stay inside their session: a supervisor that cannot connect only
//! delays its own items, and a failed item registration leaves its siblings
//! in service.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use opcpub_core::diagnostics::Diagnostics;
use opcpub_core::error::{ConfigError, ConfigResult, ConnectionError, ConnectionResult};
use opcpub_core::retry::{ExponentialBackoff, RetryConfig, RetryDecision, RetryStrategy};
use opcpub_core::types::{duration_millis, ClientHandle, ItemDescriptor, SubscriptionDescriptor};
use opcpub_dispatch::DispatchAdapter;

use crate::client::heartbeat::{HeartbeatScheduler, HeartbeatTick};
use crate::client::item::MonitoredItem;
use crate::client::pipeline::NotificationPipeline;
use crate::client::session::Session;
use crate::client::subscription::Subscription;
use crate::client::transport::{DeviceTransport, ItemRegistration, SessionEvent};

// =============================================================================
// Settings
// =============================================================================

/// Session supervision settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Upper bound for one connect attempt.
    #[serde(default = "default_connect_timeout", with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Reconnect backoff. `max_attempts = 0` retries forever.
    #[serde(default = "RetryConfig::reconnect")]
    pub reconnect: RetryConfig,

    /// Clear the skip-first latch when an item is re-registered after a reconnect.
    #[serde(default)]
    pub rearm_skip_first_on_reconnect: bool,

    /// Undelivered heartbeat ticks before ticks are skipped.
    #[serde(default = "default_heartbeat_tick_capacity")]
    pub heartbeat_tick_capacity: usize,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_heartbeat_tick_capacity() -> usize {
    1024
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            reconnect: RetryConfig::reconnect(),
            rearm_skip_first_on_reconnect: false,
            heartbeat_tick_capacity: default_heartbeat_tick_capacity(),
        }
    }
}

impl RegistrySettings {
    /// Settings with short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            reconnect: RetryConfig::reconnect()
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(1))
                .with_jitter(0.0),
            rearm_skip_first_on_reconnect: false,
            heartbeat_tick_capacity: 256,
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: RetryConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets whether reconnects re-arm skip-first.
    pub fn with_rearm_skip_first(mut self, rearm: bool) -> Self {
        self.rearm_skip_first_on_reconnect = rearm;
        self
    }
}

// =============================================================================
// Status and reports
// =============================================================================

/// Configured versus live counts of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// Configured sessions.
    pub sessions_configured: usize,
    /// Connected sessions.
    pub sessions_connected: usize,
    /// Configured subscriptions.
    pub subscriptions_configured: usize,
    /// Subscriptions created on a live session.
    pub subscriptions_connected: usize,
    /// Configured items.
    pub items_configured: usize,
    /// Registered items.
    pub items_monitored: usize,
    /// Items waiting for (re)registration.
    pub items_to_retry: usize,
}

impl RegistryStatus {
    /// Returns `true` if every configured item is registered.
    pub fn is_fully_monitored(&self) -> bool {
        self.items_configured > 0 && self.items_monitored == self.items_configured
    }
}

impl std::fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sessions={}/{} subscriptions={}/{} items={}/{} to_retry={}",
            self.sessions_connected,
            self.sessions_configured,
            self.subscriptions_connected,
            self.subscriptions_configured,
            self.items_monitored,
            self.items_configured,
            self.items_to_retry
        )
    }
}

/// First-connect outcome of every session after [`Registry::start`].
#[derive(Debug, Clone, Default)]
pub struct StartReport {
    /// Endpoints that connected.
    pub connected: Vec<String>,
    /// Endpoints that did not, with the error. Their supervisors keep retrying.
    pub faulted: Vec<(String, ConnectionError)>,
}

impl StartReport {
    /// Returns `true` if every session connected.
    pub fn all_connected(&self) -> bool {
        self.faulted.is_empty()
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Default)]
struct Graph {
    sessions: Vec<Arc<Session>>,
}

impl Graph {
    fn items(&self) -> impl Iterator<Item = &Arc<MonitoredItem>> {
        self.sessions
            .iter()
            .flat_map(|s| s.subscriptions().iter())
            .flat_map(|s| s.items().iter())
    }
}

struct Shared {
    transport: Arc<dyn DeviceTransport>,
    settings: RegistrySettings,
    scheduler: HeartbeatScheduler,
    pipeline: Arc<NotificationPipeline>,
}

#[derive(Default)]
struct Lifecycle {
    shutdown_tx: Option<watch::Sender<bool>>,
    supervisors: Vec<JoinHandle<()>>,
    heartbeat_worker: Option<JoinHandle<()>>,
}

enum PumpExit {
    Shutdown,
    Lost(String),
}

/// Owns the session graph, its supervisors and the shaping pipeline.
pub struct Registry {
    shared: Arc<Shared>,
    dispatcher: Arc<DispatchAdapter>,
    graph: RwLock<Arc<Graph>>,
    next_handle: AtomicU32,
    heartbeat_ticks: Mutex<Option<mpsc::Receiver<HeartbeatTick>>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    shut_down: AtomicBool,
}

impl Registry {
    /// Creates an empty registry.
    ///
    /// Messages go to `dispatcher`; the registry shuts it down on
    /// [`shutdown`](Self::shutdown).
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        settings: RegistrySettings,
        dispatcher: Arc<DispatchAdapter>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let (scheduler, ticks) =
            HeartbeatScheduler::new(settings.heartbeat_tick_capacity, Arc::clone(&diagnostics));
        let pipeline = Arc::new(NotificationPipeline::new(diagnostics, Arc::clone(&dispatcher)));

        Self {
            shared: Arc::new(Shared {
                transport,
                settings,
                scheduler,
                pipeline,
            }),
            dispatcher,
            graph: RwLock::new(Arc::new(Graph::default())),
            next_handle: AtomicU32::new(1),
            heartbeat_ticks: Mutex::new(Some(ticks)),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &RegistrySettings {
        &self.shared.settings
    }

    /// The notification pipeline fed by this registry's sessions.
    pub fn pipeline(&self) -> &Arc<NotificationPipeline> {
        &self.shared.pipeline
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Builds the session/subscription/item graph from `descriptors`.
    ///
    /// Descriptors naming the same endpoint share a session; those naming the
    /// same endpoint and publishing interval share a subscription. On error
    /// the current graph is kept. Reloading a running registry restarts it
    /// on the new graph.
    pub async fn load_configuration(&self, descriptors: Vec<SubscriptionDescriptor>) -> ConfigResult<()> {
        if self.is_shut_down() {
            return Err(ConfigError::validation("registry", "registry is shut down"));
        }

        let sessions = self.build_graph(descriptors)?;
        let graph = Arc::new(Graph { sessions });
        let status = Self::status_of(&graph);

        let was_running = self.stop_sessions().await;
        *self.graph.write() = graph;

        info!(
            sessions = status.sessions_configured,
            subscriptions = status.subscriptions_configured,
            items = status.items_configured,
            "Configuration loaded"
        );

        if was_running {
            self.start().await;
        }
        Ok(())
    }

    fn build_graph(&self, descriptors: Vec<SubscriptionDescriptor>) -> ConfigResult<Vec<Arc<Session>>> {
        // endpoint -> [(publishing interval, items)], first-appearance order
        let mut grouped: Vec<(String, Vec<(Duration, Vec<ItemDescriptor>)>)> = Vec::new();

        for descriptor in descriptors {
            if descriptor.items.is_empty() {
                continue;
            }
            let endpoint = descriptor.endpoint.trim().to_string();
            validate_endpoint(&endpoint)?;
            if descriptor.publishing_interval.is_zero() {
                return Err(ConfigError::unknown_subscription(
                    endpoint,
                    "publishing interval must be positive",
                ));
            }
            for item in &descriptor.items {
                if item.item_id.as_str().trim().is_empty() {
                    return Err(ConfigError::validation("item_id", format!("empty item id on {}", endpoint)));
                }
            }

            let session_index = match grouped.iter().position(|(e, _)| *e == endpoint) {
                Some(index) => index,
                None => {
                    grouped.push((endpoint, Vec::new()));
                    grouped.len() - 1
                }
            };
            let subscriptions = &mut grouped[session_index].1;
            match subscriptions
                .iter_mut()
                .find(|(interval, _)| *interval == descriptor.publishing_interval)
            {
                Some((_, items)) => items.extend(descriptor.items),
                None => subscriptions.push((descriptor.publishing_interval, descriptor.items)),
            }
        }

        if grouped.is_empty() {
            return Err(ConfigError::Empty);
        }

        for (endpoint, subscriptions) in &grouped {
            for (interval, items) in subscriptions {
                let mut seen = HashSet::new();
                for item in items {
                    if !seen.insert(item.item_id.as_str()) {
                        return Err(ConfigError::duplicate_item(
                            endpoint.as_str(),
                            *interval,
                            item.item_id.as_str(),
                        ));
                    }
                }
            }
        }

        let sessions = grouped
            .into_iter()
            .map(|(endpoint, subscriptions)| {
                let endpoint: Arc<str> = Arc::from(endpoint);
                let subscriptions = subscriptions
                    .into_iter()
                    .map(|(interval, items)| {
                        let items = items
                            .into_iter()
                            .map(|descriptor| {
                                let handle = ClientHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
                                Arc::new(MonitoredItem::new(handle, Arc::clone(&endpoint), descriptor))
                            })
                            .collect();
                        Arc::new(Subscription::new(interval, items))
                    })
                    .collect();
                Arc::new(Session::new(endpoint, subscriptions))
            })
            .collect();

        Ok(sessions)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects one session without registering its items. Idempotent.
    pub async fn connect(&self, endpoint: &str) -> ConnectionResult<()> {
        let session = self
            .session(endpoint)
            .ok_or_else(|| ConnectionError::failed(endpoint, "no such session configured"))?;
        session
            .connect(self.shared.transport.as_ref(), self.shared.settings.connect_timeout)
            .await
    }

    /// Starts one supervisor per session and waits for each first connect.
    ///
    /// Sessions that fail to connect keep retrying in the background.
    /// Calling `start` on a running registry returns the current picture.
    pub async fn start(&self) -> StartReport {
        if self.is_shut_down() {
            return StartReport::default();
        }

        let graph = self.graph();
        let mut firsts = Vec::with_capacity(graph.sessions.len());
        {
            let mut lifecycle = self.lifecycle.lock().await;

            self.shared.scheduler.start();
            if lifecycle.heartbeat_worker.is_none() {
                if let Some(ticks) = self.heartbeat_ticks.lock().take() {
                    lifecycle.heartbeat_worker = Some(self.shared.pipeline.spawn_heartbeat_worker(ticks));
                }
            }

            if lifecycle.shutdown_tx.is_some() {
                return Self::report_of(&graph);
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            for session in &graph.sessions {
                let (first_tx, first_rx) = oneshot::channel();
                lifecycle.supervisors.push(tokio::spawn(supervise(
                    Arc::clone(&self.shared),
                    Arc::clone(session),
                    shutdown_rx.clone(),
                    first_tx,
                )));
                firsts.push((session.endpoint().to_string(), first_rx));
            }
            lifecycle.shutdown_tx = Some(shutdown_tx);
        }

        let outcomes = futures::future::join_all(
            firsts
                .into_iter()
                .map(|(endpoint, rx)| async move { (endpoint, rx.await) }),
        )
        .await;

        let mut report = StartReport::default();
        for (endpoint, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => report.connected.push(endpoint),
                Ok(Err(e)) => report.faulted.push((endpoint, e)),
                Err(_) => {
                    let e = ConnectionError::shutting_down(endpoint.as_str());
                    report.faulted.push((endpoint, e));
                }
            }
        }

        info!(
            connected = report.connected.len(),
            faulted = report.faulted.len(),
            "Registry started"
        );
        report
    }

    /// Stops supervisors, unregisters every item and closes every session.
    ///
    /// Returns `true` if supervisors were running.
    async fn stop_sessions(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(shutdown_tx) = lifecycle.shutdown_tx.take() else {
            return false;
        };
        let _ = shutdown_tx.send(true);

        for supervisor in lifecycle.supervisors.drain(..) {
            if let Err(e) = supervisor.await {
                warn!(error = %e, "Session supervisor ended abnormally");
            }
        }

        let graph = self.graph();
        for session in &graph.sessions {
            for subscription in session.subscriptions() {
                for item in subscription.items() {
                    item.on_unregistered(&self.shared.scheduler);
                    self.shared.pipeline.remove(item.handle());
                }
            }
            session.close(self.shared.transport.as_ref()).await;
        }
        true
    }

    /// Stops everything the registry owns. Idempotent.
    ///
    /// Heartbeats are cancelled and sessions closed before returning. A
    /// message already being handed to dispatch finishes that hand-off or is
    /// rejected as closed; queued messages get the dispatch adapter's drain
    /// timeout.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Registry shutting down");

        let worker = self.lifecycle.lock().await.heartbeat_worker.take();
        self.shared.pipeline.close();

        let heartbeats = async {
            self.shared.scheduler.shutdown().await;
            if let Some(worker) = worker {
                if let Err(e) = worker.await {
                    warn!(error = %e, "Heartbeat worker ended abnormally");
                }
            }
        };
        // a producer blocked on a full queue gets a slot or a closed error
        tokio::join!(self.stop_sessions(), heartbeats, self.dispatcher.shutdown());

        info!("Registry stopped");
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn graph(&self) -> Arc<Graph> {
        Arc::clone(&self.graph.read())
    }

    /// Sessions in configuration order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.graph().sessions.clone()
    }

    /// Looks up a session by endpoint.
    pub fn session(&self, endpoint: &str) -> Option<Arc<Session>> {
        self.graph()
            .sessions
            .iter()
            .find(|s| s.endpoint() == endpoint.trim())
            .cloned()
    }

    /// Looks up the first item with `item_id` across all sessions.
    pub fn item(&self, item_id: &str) -> Option<Arc<MonitoredItem>> {
        self.graph()
            .items()
            .find(|i| i.item_id().as_str() == item_id)
            .cloned()
    }

    /// Configured versus live counts.
    pub fn status(&self) -> RegistryStatus {
        Self::status_of(&self.graph())
    }

    fn status_of(graph: &Graph) -> RegistryStatus {
        let mut status = RegistryStatus {
            sessions_configured: graph.sessions.len(),
            ..Default::default()
        };
        for session in &graph.sessions {
            if session.is_connected() {
                status.sessions_connected += 1;
            }
            for subscription in session.subscriptions() {
                status.subscriptions_configured += 1;
                if subscription.is_connected() {
                    status.subscriptions_connected += 1;
                }
                status.items_configured += subscription.items().len();
                status.items_monitored += subscription.monitored_count();
            }
        }
        status.items_to_retry = status.items_configured - status.items_monitored;
        status
    }

    fn report_of(graph: &Graph) -> StartReport {
        let mut report = StartReport::default();
        for session in &graph.sessions {
            if session.is_connected() {
                report.connected.push(session.endpoint().to_string());
            } else {
                let e = ConnectionError::failed(session.endpoint(), format!("session is {}", session.status()));
                report.faulted.push((session.endpoint().to_string(), e));
            }
        }
        report
    }

    /// Waits until every configured item is registered.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_until_monitored(&self, timeout: Duration) -> bool {
        let poll = async {
            loop {
                if self.status().is_fully_monitored() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("transport", &self.shared.transport.name())
            .field("status", &self.status())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn validate_endpoint(endpoint: &str) -> ConfigResult<()> {
    if endpoint.is_empty() {
        return Err(ConfigError::unknown_session(endpoint, "endpoint is empty"));
    }
    match endpoint.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !rest.trim_start_matches('/').is_empty() => Ok(()),
        _ => Err(ConfigError::unknown_session(
            endpoint,
            "expected '<scheme>://<host>[:port]'",
        )),
    }
}

// =============================================================================
// Session supervision
// =============================================================================

async fn supervise(
    shared: Arc<Shared>,
    session: Arc<Session>,
    mut shutdown: watch::Receiver<bool>,
    first: oneshot::Sender<ConnectionResult<()>>,
) {
    let strategy = ExponentialBackoff::new(shared.settings.reconnect.clone());
    let mut first = Some(first);
    let mut attempt = 0u32;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let connected = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = session.connect(shared.transport.as_ref(), shared.settings.connect_timeout) => result,
        };

        let error = match connected {
            Ok(()) => {
                attempt = 0;
                shared.register_session(&session).await;
                if let Some(first) = first.take() {
                    let _ = first.send(Ok(()));
                }

                match shared.pump(&session, &mut shutdown).await {
                    PumpExit::Shutdown => break,
                    PumpExit::Lost(reason) => {
                        shared.fault_session(&session, &reason).await;
                        ConnectionError::lost(session.endpoint(), reason)
                    }
                }
            }
            Err(e) => {
                if let Some(first) = first.take() {
                    let _ = first.send(Err(e.clone()));
                }
                e
            }
        };

        attempt += 1;
        match strategy.should_retry(&error, attempt) {
            RetryDecision::Retry(delay) => {
                info!(
                    endpoint = %session.endpoint(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Reconnect scheduled"
                );
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::DoNotRetry => {
                error!(
                    endpoint = %session.endpoint(),
                    attempts = attempt,
                    error = %error,
                    "Giving up on session"
                );
                break;
            }
        }
    }

    debug!(endpoint = %session.endpoint(), "Session supervisor stopped");
}

impl Shared {
    /// Creates every subscription and registers every item of a fresh session.
    async fn register_session(&self, session: &Session) {
        let Some(session_handle) = session.handle() else {
            return;
        };
        let rearm = self.settings.rearm_skip_first_on_reconnect;

        for subscription in session.subscriptions() {
            let subscription_handle = match self
                .transport
                .create_subscription(session_handle, subscription.publishing_interval())
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(
                        endpoint = %session.endpoint(),
                        publishing_interval_ms = subscription.publishing_interval().as_millis() as u64,
                        error = %e,
                        "Subscription creation failed"
                    );
                    for item in subscription.items() {
                        item.on_registration_failed(&self.scheduler, &e);
                    }
                    continue;
                }
            };
            subscription.set_handle(subscription_handle);

            for item in subscription.items() {
                let registration = ItemRegistration {
                    client_handle: item.handle(),
                    descriptor: item.descriptor().clone(),
                };
                match self
                    .transport
                    .register_item(session_handle, subscription_handle, &registration)
                    .await
                {
                    Ok(_) => {
                        self.pipeline.insert(Arc::clone(item));
                        item.on_registered(&self.scheduler, rearm);
                    }
                    Err(e) => {
                        warn!(
                            endpoint = %session.endpoint(),
                            item_id = %item.item_id(),
                            error = %e,
                            "Item registration failed"
                        );
                        item.on_registration_failed(&self.scheduler, &e);
                    }
                }
            }
        }

        debug!(
            endpoint = %session.endpoint(),
            items = session.item_count(),
            "Session registration complete"
        );
    }

    /// Feeds the session's events into the pipeline until it ends.
    async fn pump(&self, session: &Session, shutdown: &mut watch::Receiver<bool>) -> PumpExit {
        let Some(mut events) = session.take_events() else {
            return PumpExit::Lost("event stream unavailable".to_string());
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return PumpExit::Shutdown,
                event = events.recv() => match event {
                    Some(SessionEvent::Notification(notification)) => {
                        self.pipeline.dispatch(notification).await;
                    }
                    Some(SessionEvent::Disconnected { reason }) => return PumpExit::Lost(reason),
                    None => return PumpExit::Lost("event stream closed".to_string()),
                },
            }
        }
    }

    /// Takes a lost session's items out of service and releases the transport session.
    async fn fault_session(&self, session: &Session, reason: &str) {
        for subscription in session.subscriptions() {
            for item in subscription.items() {
                item.on_faulted(&self.scheduler);
            }
        }
        if let Some(handle) = session.mark_faulted() {
            if let Err(e) = self.transport.close(handle).await {
                debug!(endpoint = %session.endpoint(), error = %e, "Closing lost session failed");
            }
        }
        warn!(endpoint = %session.endpoint(), reason = reason, "Session lost");
    }
}

// =============================================================================
// Tests
// =============================================================================
