// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Publisher context.
//!
//! Everything a running publisher needs, wired together in one value:
//! diagnostics counters, the dispatch adapter and the registry that owns the
//! sessions. Nothing is process-global, so several contexts can run side by
//! side (tests do this constantly).
//!
//! ```rust,ignore
//! let context = PublisherContext::builder()
//!     .device_transport(Arc::new(SimulatedTransport::new()))
//!     .outbound_transport(Arc::new(HttpOutboundTransport::new(url, timeout)?))
//!     .product_info("OpcPublisher")
//!     .build()
//!     .await?;
//!
//! context.load_configuration(descriptors).await?;
//! context.start().await;
//! // ...
//! context.shutdown().await;
//! ```

use std::sync::Arc;

use tracing::info;

use opcpub_core::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use opcpub_core::error::{ConfigError, ConfigResult, PublisherResult};
use opcpub_core::types::SubscriptionDescriptor;
use opcpub_dispatch::{DispatchAdapter, DispatchConfig, OutboundTransport};

use crate::client::transport::DeviceTransport;
use crate::registry::{Registry, RegistrySettings, RegistryStatus, StartReport};

/// Default product identity.
pub const DEFAULT_PRODUCT_INFO: &str = "OpcPublisher";

/// One independent publisher instance.
pub struct PublisherContext {
    product_info: String,
    diagnostics: Arc<Diagnostics>,
    dispatcher: Arc<DispatchAdapter>,
    registry: Registry,
}

impl PublisherContext {
    /// Creates a context builder.
    pub fn builder() -> PublisherContextBuilder {
        PublisherContextBuilder::default()
    }

    /// Product identity attached to every message.
    pub fn product_info(&self) -> &str {
        &self.product_info
    }

    /// Shared diagnostics counters.
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Consistent snapshot of the counters.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// The dispatch adapter.
    pub fn dispatcher(&self) -> &Arc<DispatchAdapter> {
        &self.dispatcher
    }

    /// The session registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Configured versus live counts.
    pub fn status(&self) -> RegistryStatus {
        self.registry.status()
    }

    /// Loads (or reloads) the node configuration.
    pub async fn load_configuration(&self, descriptors: Vec<SubscriptionDescriptor>) -> ConfigResult<()> {
        self.registry.load_configuration(descriptors).await
    }

    /// Connects every session and registers their items.
    pub async fn start(&self) -> StartReport {
        self.registry.start().await
    }

    /// Stops sessions, heartbeats and dispatch. Idempotent.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        info!(diagnostics = %self.diagnostics.snapshot(), "Publisher context stopped");
    }
}

impl std::fmt::Debug for PublisherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherContext")
            .field("product_info", &self.product_info)
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`PublisherContext`].
#[derive(Default)]
pub struct PublisherContextBuilder {
    device: Option<Arc<dyn DeviceTransport>>,
    outbound: Option<Arc<dyn OutboundTransport>>,
    registry: RegistrySettings,
    dispatch: DispatchConfig,
    product_info: Option<String>,
}

impl PublisherContextBuilder {
    /// Sets the device transport.
    pub fn device_transport(mut self, transport: Arc<dyn DeviceTransport>) -> Self {
        self.device = Some(transport);
        self
    }

    /// Sets the outbound transport.
    pub fn outbound_transport(mut self, transport: Arc<dyn OutboundTransport>) -> Self {
        self.outbound = Some(transport);
        self
    }

    /// Sets the session supervision settings.
    pub fn registry_settings(mut self, settings: RegistrySettings) -> Self {
        self.registry = settings;
        self
    }

    /// Sets the dispatch configuration.
    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    /// Sets the product identity.
    pub fn product_info(mut self, product_info: impl Into<String>) -> Self {
        self.product_info = Some(product_info.into());
        self
    }

    /// Builds the context and starts its dispatch workers.
    ///
    /// Sessions are not connected until [`PublisherContext::start`].
    pub async fn build(self) -> PublisherResult<PublisherContext> {
        let device = self
            .device
            .ok_or_else(|| ConfigError::validation("device_transport", "device transport is required"))?;
        let outbound = self
            .outbound
            .ok_or_else(|| ConfigError::validation("outbound_transport", "outbound transport is required"))?;
        let product_info = self
            .product_info
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PRODUCT_INFO.to_string());

        let diagnostics = Arc::new(Diagnostics::new());
        let dispatcher = Arc::new(DispatchAdapter::new(
            outbound,
            self.dispatch,
            Arc::clone(&diagnostics),
            product_info.clone(),
        ));
        dispatcher.start().await;

        let registry = Registry::new(
            device,
            self.registry,
            Arc::clone(&dispatcher),
            Arc::clone(&diagnostics),
        );

        info!(product_info = %product_info, "Publisher context created");

        Ok(PublisherContext {
            product_info,
            diagnostics,
            dispatcher,
            registry,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
