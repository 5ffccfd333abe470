// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Publisher runtime orchestration.
//!
//! Startup order:
//!
//! 1. Settings and published nodes are loaded (by the builder)
//! 2. The outbound and device transports are created
//! 3. A [`PublisherContext`] is built and its dispatch workers start
//! 4. The node configuration is loaded and sessions are started
//! 5. Diagnostics are reported every `diagnostics.interval`
//!
//! On shutdown the context stops sessions, heartbeats and dispatch, and a
//! final diagnostics report is written.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use opcpub_config::{
    load_published_nodes, DiagnosticsSection, DispatchSection, PublisherSettings, SessionSection,
    SettingsLoader,
};
use opcpub_core::error::PublisherError;
use opcpub_core::types::SubscriptionDescriptor;
use opcpub_dispatch::{render_text, DispatchConfig, DispatchMetricsCollector, HttpOutboundTransport, OutboundTransport};
use opcpub_opcua::{DeviceTransport, PublisherContext, RegistrySettings, SimulatedTransport};

use crate::error::{BinError, BinResult};
use crate::shutdown::{ShutdownCoordinator, ShutdownListener};

// =============================================================================
// PublisherRuntime
// =============================================================================

/// The running publisher process.
pub struct PublisherRuntime {
    settings: PublisherSettings,
    descriptors: Vec<SubscriptionDescriptor>,
    device: Arc<dyn DeviceTransport>,
    outbound: Option<Arc<dyn OutboundTransport>>,
    shutdown: ShutdownCoordinator,
}

impl PublisherRuntime {
    /// Loaded settings.
    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Resolved subscription descriptors.
    pub fn descriptors(&self) -> &[SubscriptionDescriptor] {
        &self.descriptors
    }

    /// Handle that stops [`run`](Self::run) when triggered.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the publisher until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            version = opcpub_core::VERSION,
            product_info = %self.settings.publisher.product_info,
            "Starting opcpub"
        );

        let outbound = match self.outbound.clone() {
            Some(outbound) => outbound,
            None => Arc::new(
                HttpOutboundTransport::new(
                    self.settings.dispatch.endpoint_url.clone(),
                    self.settings.dispatch.request_timeout,
                )
                .map_err(PublisherError::from)?,
            ),
        };

        let context = PublisherContext::builder()
            .device_transport(Arc::clone(&self.device))
            .outbound_transport(outbound)
            .registry_settings(registry_settings(&self.settings.session))
            .dispatch_config(dispatch_config(&self.settings.dispatch, &self.settings.diagnostics))
            .product_info(self.settings.publisher.product_info.clone())
            .build()
            .await
            .map_err(|e| BinError::from(e).context("Failed to build publisher context"))?;
        let context = Arc::new(context);

        if let Err(e) = context.load_configuration(self.descriptors.clone()).await {
            context.shutdown().await;
            return Err(BinError::from(PublisherError::from(e)));
        }

        let report = context.start().await;
        for (endpoint, error) in &report.faulted {
            warn!(endpoint = %endpoint, error = %error, "Session not connected at startup, retrying in background");
        }
        info!(
            connected = report.connected.len(),
            faulted = report.faulted.len(),
            status = %context.status(),
            "opcpub is ready"
        );

        let reporter = DiagnosticsReporter::new(&self.settings.diagnostics);
        let reporter_task = tokio::spawn(reporter.clone().run(Arc::clone(&context), self.shutdown.subscribe()));

        self.shutdown.wait().await;
        info!("Shutdown initiated, cleaning up...");

        if let Err(e) = reporter_task.await {
            warn!(error = %e, "Diagnostics task ended abnormally");
        }
        context.shutdown().await;

        if let Err(e) = reporter.report(&context).await {
            warn!(error = %e, "Final diagnostics report failed");
        }
        info!("opcpub shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for PublisherRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherRuntime")
            .field("product_info", &self.settings.publisher.product_info)
            .field("subscriptions", &self.descriptors.len())
            .field("device", &self.device.name())
            .finish()
    }
}

/// Maps the `session` section onto registry settings.
pub fn registry_settings(section: &SessionSection) -> RegistrySettings {
    RegistrySettings::default()
        .with_connect_timeout(section.connect_timeout)
        .with_reconnect(section.reconnect.clone())
        .with_rearm_skip_first(section.rearm_skip_first_on_reconnect)
}

/// Maps the `dispatch` and `diagnostics` sections onto a dispatch config.
pub fn dispatch_config(dispatch: &DispatchSection, diagnostics: &DiagnosticsSection) -> DispatchConfig {
    DispatchConfig::builder()
        .queue_capacity(dispatch.queue_capacity)
        .workers(dispatch.workers)
        .max_send_attempts(dispatch.max_send_attempts)
        .retry_base_delay(dispatch.retry_base_delay)
        .max_retry_delay(dispatch.max_retry_delay)
        .jitter(dispatch.jitter)
        .send_timeout(dispatch.request_timeout)
        .shutdown_timeout(dispatch.shutdown_timeout)
        .enable_metrics(diagnostics.enable_metrics)
        .build()
}

// =============================================================================
// DiagnosticsReporter
// =============================================================================

/// Periodically logs counters and registry status.
#[derive(Debug, Clone)]
pub struct DiagnosticsReporter {
    interval: Duration,
    prometheus_path: Option<PathBuf>,
    metrics: DispatchMetricsCollector,
}

impl DiagnosticsReporter {
    /// Creates a reporter from the `diagnostics` section.
    pub fn new(section: &DiagnosticsSection) -> Self {
        Self {
            interval: section.interval,
            prometheus_path: section.prometheus_path.clone(),
            metrics: DispatchMetricsCollector::new(section.enable_metrics),
        }
    }

    /// Logs one report and refreshes the Prometheus textfile.
    pub async fn report(&self, context: &PublisherContext) -> BinResult<()> {
        let snapshot = context.snapshot();
        let status = context.status();

        info!(
            diagnostics = %snapshot,
            in_flight = snapshot.in_flight(),
            status = %status,
            "Diagnostics"
        );

        self.metrics.observe_snapshot(&snapshot);
        self.metrics.observe_registry(
            status.sessions_configured,
            status.sessions_connected,
            status.items_configured,
            status.items_monitored,
        );

        if let Some(ref path) = self.prometheus_path {
            write_textfile(path).await?;
        }
        Ok(())
    }

    async fn run(self, context: Arc<PublisherContext>, mut shutdown: ShutdownListener) {
        if self.interval.is_zero() {
            shutdown.triggered().await;
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.report(&context).await {
                        warn!(error = %e, "Diagnostics report failed");
                    }
                }
            }
        }
    }
}

/// Writes the Prometheus text exposition atomically (write then rename).
async fn write_textfile(path: &Path) -> BinResult<()> {
    let text = render_text().map_err(|e| BinError::render("metrics", e))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, text)
        .await
        .map_err(|source| BinError::Textfile { path: tmp.clone(), source })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| BinError::Textfile { path: path.to_path_buf(), source })?;
    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the publisher runtime.
#[derive(Default)]
pub struct RuntimeBuilder {
    settings_path: Option<PathBuf>,
    settings: Option<PublisherSettings>,
    nodes_path: Option<PathBuf>,
    endpoint_url: Option<String>,
    device: Option<Arc<dyn DeviceTransport>>,
    outbound: Option<Arc<dyn OutboundTransport>>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settings file path.
    pub fn settings_path(mut self, path: impl AsRef<Path>) -> Self {
        self.settings_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets already loaded settings.
    pub fn settings(mut self, settings: PublisherSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Overrides the published nodes file.
    pub fn nodes_path(mut self, path: Option<PathBuf>) -> Self {
        self.nodes_path = path;
        self
    }

    /// Overrides the outbound endpoint URL.
    pub fn endpoint_url(mut self, url: Option<String>) -> Self {
        self.endpoint_url = url;
        self
    }

    /// Sets the device transport. Defaults to [`SimulatedTransport`].
    pub fn device_transport(mut self, transport: Arc<dyn DeviceTransport>) -> Self {
        self.device = Some(transport);
        self
    }

    /// Sets the outbound transport. Defaults to HTTP at `dispatch.endpoint_url`.
    pub fn outbound_transport(mut self, transport: Arc<dyn OutboundTransport>) -> Self {
        self.outbound = Some(transport);
        self
    }

    /// Loads settings and published nodes and builds the runtime.
    pub fn build(self) -> BinResult<PublisherRuntime> {
        let mut settings = match self.settings {
            Some(settings) => settings,
            None => {
                let path = self.settings_path.ok_or(BinError::MissingSettings)?;
                SettingsLoader::new().load(&path).map_err(|e| {
                    BinError::from(e).context(format!("Failed to load settings from {}", path.display()))
                })?
            }
        };

        if let Some(path) = self.nodes_path {
            settings.nodes.published_nodes_file = path;
        }
        if let Some(url) = self.endpoint_url {
            settings.dispatch.endpoint_url = url;
        }
        settings.validate()?;

        let nodes_file = settings.nodes.published_nodes_file.clone();
        let descriptors = load_published_nodes(&nodes_file, &settings.nodes).map_err(|e| {
            BinError::from(e).context(format!("Failed to load published nodes from {}", nodes_file.display()))
        })?;

        let device = self
            .device
            .unwrap_or_else(|| Arc::new(SimulatedTransport::new()));

        Ok(PublisherRuntime {
            settings,
            descriptors,
            device,
            outbound: self.outbound,
            shutdown: ShutdownCoordinator::new(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
