// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Settings schema.
//!
//! ```yaml
//! publisher:
//!   product_info: OpcPublisher
//! nodes:
//!   published_nodes_file: publishednodes.json
//!   default_heartbeat_interval: 0      # seconds
//!   default_skip_first: false
//!   default_sampling_interval: 1000    # ms
//!   default_publishing_interval: 1000  # ms
//! session:
//!   connect_timeout: 10000             # ms
//!   rearm_skip_first_on_reconnect: false
//!   reconnect:
//!     max_attempts: 0                  # 0 = forever
//!     initial_delay: 1000
//!     max_delay: 60000
//! dispatch:
//!   endpoint_url: http://localhost:8080/telemetry
//!   queue_capacity: 1024
//!   workers: 4
//!   max_send_attempts: 3
//! diagnostics:
//!   interval: 60                       # seconds, 0 disables
//!   prometheus_path: /var/lib/node_exporter/opcpub.prom
//! logging:
//!   level: info
//!   format: text
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use opcpub_core::retry::RetryConfig;
use opcpub_core::types::{duration_millis, duration_secs};

use crate::error::{SettingsError, SettingsResult};

// =============================================================================
// PublisherSettings
// =============================================================================

/// Root settings structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublisherSettings {
    /// Publisher identity.
    #[serde(default)]
    pub publisher: PublisherSection,

    /// Published nodes source and per-item defaults.
    #[serde(default)]
    pub nodes: NodesSection,

    /// Device session supervision.
    #[serde(default)]
    pub session: SessionSection,

    /// Outbound dispatch.
    #[serde(default)]
    pub dispatch: DispatchSection,

    /// Periodic diagnostics output.
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PublisherSettings {
    /// Validates every section.
    pub fn validate(&self) -> SettingsResult<()> {
        self.publisher.validate()?;
        self.nodes.validate()?;
        self.session.validate()?;
        self.dispatch.validate()?;
        Ok(())
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Publisher identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherSection {
    /// Product identity attached to every outbound message.
    #[serde(default = "default_product_info")]
    pub product_info: String,
}

fn default_product_info() -> String {
    "OpcPublisher".to_string()
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            product_info: default_product_info(),
        }
    }
}

impl PublisherSection {
    fn validate(&self) -> SettingsResult<()> {
        if self.product_info.trim().is_empty() {
            return Err(SettingsError::validation("publisher.product_info", "cannot be empty"));
        }
        Ok(())
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// Published nodes source and defaults for values a node leaves out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodesSection {
    /// Path to the published nodes JSON file.
    #[serde(default = "default_published_nodes_file")]
    pub published_nodes_file: PathBuf,

    /// Heartbeat interval for nodes without one; zero disables.
    #[serde(default, with = "duration_secs")]
    pub default_heartbeat_interval: Duration,

    /// Skip-first for nodes without a setting.
    #[serde(default)]
    pub default_skip_first: bool,

    /// Sampling interval for nodes without one.
    #[serde(default = "default_sampling_interval", with = "duration_millis")]
    pub default_sampling_interval: Duration,

    /// Publishing interval for nodes without one.
    #[serde(default = "default_publishing_interval", with = "duration_millis")]
    pub default_publishing_interval: Duration,
}

fn default_published_nodes_file() -> PathBuf {
    PathBuf::from("publishednodes.json")
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

impl Default for NodesSection {
    fn default() -> Self {
        Self {
            published_nodes_file: default_published_nodes_file(),
            default_heartbeat_interval: Duration::ZERO,
            default_skip_first: false,
            default_sampling_interval: default_sampling_interval(),
            default_publishing_interval: default_publishing_interval(),
        }
    }
}

impl NodesSection {
    fn validate(&self) -> SettingsResult<()> {
        if self.published_nodes_file.as_os_str().is_empty() {
            return Err(SettingsError::validation("nodes.published_nodes_file", "cannot be empty"));
        }
        if self.default_publishing_interval.is_zero() {
            return Err(SettingsError::validation(
                "nodes.default_publishing_interval",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Device session supervision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    /// Upper bound for one connect attempt.
    #[serde(default = "default_connect_timeout", with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Reconnect backoff.
    #[serde(default = "RetryConfig::reconnect")]
    pub reconnect: RetryConfig,

    /// Clear the skip-first latch when items are re-registered after a reconnect.
    #[serde(default)]
    pub rearm_skip_first_on_reconnect: bool,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            reconnect: RetryConfig::reconnect(),
            rearm_skip_first_on_reconnect: false,
        }
    }
}

impl SessionSection {
    fn validate(&self) -> SettingsResult<()> {
        if self.connect_timeout.is_zero() {
            return Err(SettingsError::validation("session.connect_timeout", "must be greater than 0"));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(SettingsError::validation(
                "session.reconnect.multiplier",
                "must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(SettingsError::validation(
                "session.reconnect.jitter",
                "must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Outbound dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSection {
    /// Telemetry ingestion URL.
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Total queued messages before producers wait.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent send workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Attempts per message, including the first.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_retry_base_delay", with = "duration_millis")]
    pub retry_base_delay: Duration,

    /// Maximum delay between retries.
    #[serde(default = "default_max_retry_delay", with = "duration_millis")]
    pub max_retry_delay: Duration,

    /// Retry jitter factor (0.0 to 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Timeout of one HTTP request.
    #[serde(default = "default_request_timeout", with = "duration_millis")]
    pub request_timeout: Duration,

    /// How long shutdown waits for queued messages.
    #[serde(default = "default_shutdown_timeout", with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

fn default_endpoint_url() -> String {
    "http://localhost:8080/telemetry".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    4
}

fn default_max_send_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_jitter() -> f64 {
    0.1
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            max_send_attempts: default_max_send_attempts(),
            retry_base_delay: default_retry_base_delay(),
            max_retry_delay: default_max_retry_delay(),
            jitter: default_jitter(),
            request_timeout: default_request_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl DispatchSection {
    fn validate(&self) -> SettingsResult<()> {
        if !(self.endpoint_url.starts_with("http://") || self.endpoint_url.starts_with("https://")) {
            return Err(SettingsError::validation(
                "dispatch.endpoint_url",
                "must start with http:// or https://",
            ));
        }
        if self.workers == 0 {
            return Err(SettingsError::validation("dispatch.workers", "must be greater than 0"));
        }
        if self.queue_capacity < self.workers {
            return Err(SettingsError::validation(
                "dispatch.queue_capacity",
                "must be at least the number of workers",
            ));
        }
        if self.max_send_attempts == 0 {
            return Err(SettingsError::validation(
                "dispatch.max_send_attempts",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SettingsError::validation("dispatch.jitter", "must be between 0.0 and 1.0"));
        }
        if self.request_timeout.is_zero() {
            return Err(SettingsError::validation("dispatch.request_timeout", "must be greater than 0"));
        }
        Ok(())
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Periodic diagnostics output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSection {
    /// Interval between diagnostics log lines; zero disables.
    #[serde(default = "default_diagnostics_interval", with = "duration_secs")]
    pub interval: Duration,

    /// Prometheus textfile written on every interval.
    #[serde(default)]
    pub prometheus_path: Option<PathBuf>,

    /// Record Prometheus metrics.
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
}

fn default_diagnostics_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_enable_metrics() -> bool {
    true
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            interval: default_diagnostics_interval(),
            prometheus_path: None,
            enable_metrics: default_enable_metrics(),
        }
    }
}

impl DiagnosticsSection {
    /// Returns `true` if diagnostics are printed periodically.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
    /// Compact text.
    Compact,
}

impl LogFormat {
    /// Parses a format name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
            LogFormat::Compact => f.write_str("compact"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = PublisherSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.publisher.product_info, "OpcPublisher");
        assert_eq!(settings.nodes.default_heartbeat_interval, Duration::ZERO);
        assert!(!settings.session.rearm_skip_first_on_reconnect);
        assert_eq!(settings.session.reconnect.max_attempts, 0);
        assert!(settings.diagnostics.prometheus_path.is_none());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let settings: PublisherSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, PublisherSettings::default());
    }

    #[test]
    fn test_validation_failures() {
        let mut settings = PublisherSettings::default();
        settings.dispatch.workers = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Validation { ref field, .. }) if field == "dispatch.workers"
        ));

        let mut settings = PublisherSettings::default();
        settings.dispatch.endpoint_url = "ftp://example".to_string();
        assert!(settings.validate().is_err());

        let mut settings = PublisherSettings::default();
        settings.publisher.product_info = "  ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = PublisherSettings::default();
        settings.nodes.default_publishing_interval = Duration::ZERO;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_log_parsing() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Text));
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
