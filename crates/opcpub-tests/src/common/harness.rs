// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! [`TestPublisher`] wires a [`PublisherContext`] to a
//! [`FakeDeviceTransport`] and a [`RecordingOutboundTransport`].

use std::sync::Arc;
use std::time::Duration;

use opcpub_core::diagnostics::DiagnosticsSnapshot;
use opcpub_core::types::{EmitReason, Message, SubscriptionDescriptor};
use opcpub_dispatch::DispatchConfig;
use opcpub_opcua::{PublisherContext, RegistrySettings, RegistryStatus, StartReport};

use super::init_test_logging;
use super::mocks::{FakeDeviceTransport, RecordingOutboundTransport};

/// Product identity used by the harness.
pub const TEST_PRODUCT_INFO: &str = "TestPublisher";

// =============================================================================
// TestPublisherBuilder
// =============================================================================

/// Builder for [`TestPublisher`].
pub struct TestPublisherBuilder {
    registry: RegistrySettings,
    dispatch: DispatchConfig,
    device: Arc<FakeDeviceTransport>,
    outbound: Arc<RecordingOutboundTransport>,
    product_info: String,
}

impl Default for TestPublisherBuilder {
    fn default() -> Self {
        Self {
            registry: RegistrySettings::for_testing(),
            dispatch: DispatchConfig::for_testing(),
            device: Arc::new(FakeDeviceTransport::new()),
            outbound: Arc::new(RecordingOutboundTransport::new()),
            product_info: TEST_PRODUCT_INFO.to_string(),
        }
    }
}

impl TestPublisherBuilder {
    /// Sets the registry settings.
    pub fn registry_settings(mut self, settings: RegistrySettings) -> Self {
        self.registry = settings;
        self
    }

    /// Re-arms skip-first on reconnect.
    pub fn rearm_skip_first(mut self, rearm: bool) -> Self {
        self.registry = self.registry.with_rearm_skip_first(rearm);
        self
    }

    /// Sets the dispatch configuration.
    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    /// Uses a pre-scripted device transport.
    pub fn device(mut self, device: Arc<FakeDeviceTransport>) -> Self {
        self.device = device;
        self
    }

    /// Uses a pre-scripted outbound transport.
    pub fn outbound(mut self, outbound: Arc<RecordingOutboundTransport>) -> Self {
        self.outbound = outbound;
        self
    }

    /// Sets the product identity.
    pub fn product_info(mut self, product_info: impl Into<String>) -> Self {
        self.product_info = product_info.into();
        self
    }

    /// Builds the context. Dispatch workers are running afterwards.
    pub async fn build(self) -> TestPublisher {
        init_test_logging();
        let context = PublisherContext::builder()
            .device_transport(Arc::clone(&self.device) as _)
            .outbound_transport(Arc::clone(&self.outbound) as _)
            .registry_settings(self.registry)
            .dispatch_config(self.dispatch)
            .product_info(self.product_info)
            .build()
            .await
            .expect("Failed to build publisher context");

        TestPublisher {
            context,
            device: self.device,
            outbound: self.outbound,
        }
    }
}

// =============================================================================
// TestPublisher
// =============================================================================

/// A publisher context driven by fake transports.
pub struct TestPublisher {
    context: PublisherContext,
    device: Arc<FakeDeviceTransport>,
    outbound: Arc<RecordingOutboundTransport>,
}

impl TestPublisher {
    /// Creates a publisher with test settings.
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// Creates a builder.
    pub fn builder() -> TestPublisherBuilder {
        TestPublisherBuilder::default()
    }

    /// Loads `descriptors` and starts the registry.
    pub async fn start_with(&self, descriptors: Vec<SubscriptionDescriptor>) -> StartReport {
        self.context
            .load_configuration(descriptors)
            .await
            .expect("Failed to load configuration");
        self.context.start().await
    }

    /// The publisher context.
    pub fn context(&self) -> &PublisherContext {
        &self.context
    }

    /// The fake device.
    pub fn device(&self) -> &Arc<FakeDeviceTransport> {
        &self.device
    }

    /// The recording outbound transport.
    pub fn outbound(&self) -> &Arc<RecordingOutboundTransport> {
        &self.outbound
    }

    /// Every delivered message.
    pub fn messages(&self) -> Vec<Message> {
        self.outbound.messages()
    }

    /// Delivered data-change messages.
    pub fn data_changes(&self) -> Vec<Message> {
        self.messages_with(EmitReason::DataChange)
    }

    /// Delivered heartbeat messages.
    pub fn heartbeats(&self) -> Vec<Message> {
        self.messages_with(EmitReason::Heartbeat)
    }

    /// Delivered messages for one item.
    pub fn messages_for(&self, item_id: &str) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.item_id.as_str() == item_id)
            .collect()
    }

    fn messages_with(&self, reason: EmitReason) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.reason == reason)
            .collect()
    }

    /// Current diagnostics counters.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.context.snapshot()
    }

    /// Current registry status.
    pub fn status(&self) -> RegistryStatus {
        self.context.status()
    }

    /// Waits until at least `count` messages were delivered.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.outbound.wait_for(count))
            .await
            .is_ok()
    }

    /// Waits until every configured item is registered.
    pub async fn wait_until_monitored(&self, timeout: Duration) -> bool {
        self.context.registry().wait_until_monitored(timeout).await
    }

    /// Waits until the pipeline has received at least one notification.
    pub async fn wait_until_first_event(&self, timeout: Duration) -> bool {
        let poll = async {
            while self.snapshot().events_received == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// Waits until the session to `endpoint` has connected `count` times.
    pub async fn wait_for_connects(&self, endpoint: &str, count: u64, timeout: Duration) -> bool {
        let poll = async {
            loop {
                let connects = self
                    .context
                    .registry()
                    .session(endpoint)
                    .map(|s| s.connect_count())
                    .unwrap_or(0);
                if connects >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// Lets background tasks run for `duration`.
    pub async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Shuts the context down.
    pub async fn shutdown(&self) {
        self.context.shutdown().await;
    }
}

impl std::fmt::Debug for TestPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPublisher")
            .field("device", &self.device)
            .field("delivered", &self.outbound.sent_count())
            .finish()
    }
}
