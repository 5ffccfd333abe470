// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for opcpub.
//!
//! Every failure the publisher can observe falls into one of five families.
//! Faults local to one session or one item are contained by the component
//! that sees them; only resource exhaustion is surfaced to lifecycle callers.
//!
//! # Error Hierarchy
//!
//! ```text
//! PublisherError (root)
//! ├── ConfigError        - Invalid or duplicate node descriptors
//! ├── ConnectionError    - Device session connect / disconnect (transient)
//! ├── RegistrationError  - Subscription or monitored item creation
//! ├── TransportError     - Outbound telemetry send failure
//! └── DispatchError      - Dispatch queue closed or saturated
//! ```
//!
//! # Examples
//!
//! ```
//! use opcpub_core::error::{ConnectionError, PublisherError};
//! use std::time::Duration;
//!
//! let error = ConnectionError::timeout("opc.tcp://plc:50000", Duration::from_secs(5));
//! assert!(error.is_retryable());
//!
//! let root: PublisherError = error.into();
//! assert_eq!(root.error_type(), "connection");
//! ```

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// PublisherError - Root Error Type
// =============================================================================

/// The root error type for opcpub.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// Node configuration is invalid.
    #[error("Configuration invalid: {0}")]
    Config(#[from] ConfigError),

    /// Device session error.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Subscription or item registration error.
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Outbound transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Dispatch queue error.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl PublisherError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublisherError::Connection(e) => e.is_retryable(),
            PublisherError::Registration(e) => e.is_retryable(),
            PublisherError::Transport(e) => e.is_retryable(),
            PublisherError::Config(_) | PublisherError::Dispatch(_) => false,
        }
    }

    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            PublisherError::Config(_) => "config",
            PublisherError::Connection(_) => "connection",
            PublisherError::Registration(_) => "registration",
            PublisherError::Transport(_) => "transport",
            PublisherError::Dispatch(_) => "dispatch",
        }
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Errors raised while building the session/subscription/item graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No descriptors were supplied.
    #[error("Configuration contains no nodes")]
    Empty,

    /// A descriptor names an endpoint that cannot identify a session.
    #[error("Unknown session endpoint '{endpoint}': {message}")]
    UnknownSession {
        /// The offending endpoint string.
        endpoint: String,
        /// Why it was rejected.
        message: String,
    },

    /// A descriptor names a publishing interval that cannot identify a subscription.
    #[error("Unknown subscription on '{endpoint}': {message}")]
    UnknownSubscription {
        /// The owning endpoint.
        endpoint: String,
        /// Why it was rejected.
        message: String,
    },

    /// The same item id appears twice in one subscription.
    #[error("Duplicate item '{item_id}' in subscription {endpoint}@{publishing_interval_ms}ms")]
    DuplicateItem {
        /// The owning endpoint.
        endpoint: String,
        /// Publishing interval of the subscription in milliseconds.
        publishing_interval_ms: u64,
        /// The duplicated item id.
        item_id: String,
    },

    /// A field failed validation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates an unknown session error.
    pub fn unknown_session(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnknownSession {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown subscription error.
    pub fn unknown_subscription(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnknownSubscription {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate item error.
    pub fn duplicate_item(
        endpoint: impl Into<String>,
        publishing_interval: Duration,
        item_id: impl Into<String>,
    ) -> Self {
        Self::DuplicateItem {
            endpoint: endpoint.into(),
            publishing_interval_ms: publishing_interval.as_millis() as u64,
            item_id: item_id.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Device session errors. Always transient from the registry's point of view.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The endpoint refused or dropped the connection.
    #[error("Connection to '{endpoint}' failed: {message}")]
    Failed {
        /// Endpoint URL.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The connect attempt timed out.
    #[error("Connection to '{endpoint}' timed out after {duration:?}")]
    Timeout {
        /// Endpoint URL.
        endpoint: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The session was lost after being established.
    #[error("Session to '{endpoint}' lost: {reason}")]
    Lost {
        /// Endpoint URL.
        endpoint: String,
        /// Reason reported by the transport.
        reason: String,
    },

    /// The owning registry is shutting down.
    #[error("Session to '{endpoint}' is shutting down")]
    ShuttingDown {
        /// Endpoint URL.
        endpoint: String,
    },
}

impl ConnectionError {
    /// Creates a connection failed error.
    pub fn failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
            duration,
        }
    }

    /// Creates a session lost error.
    pub fn lost(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lost {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a shutting down error.
    pub fn shutting_down(endpoint: impl Into<String>) -> Self {
        Self::ShuttingDown {
            endpoint: endpoint.into(),
        }
    }

    /// Returns the endpoint this error refers to.
    pub fn endpoint(&self) -> &str {
        match self {
            ConnectionError::Failed { endpoint, .. }
            | ConnectionError::Timeout { endpoint, .. }
            | ConnectionError::Lost { endpoint, .. }
            | ConnectionError::ShuttingDown { endpoint } => endpoint,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectionError::ShuttingDown { .. })
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConnectionError::Failed { .. } => "connection_failed",
            ConnectionError::Timeout { .. } => "timeout",
            ConnectionError::Lost { .. } => "session_lost",
            ConnectionError::ShuttingDown { .. } => "shutting_down",
        }
    }
}

// =============================================================================
// RegistrationError
// =============================================================================

/// Subscription or monitored item registration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// Creating a subscription failed.
    #[error("Failed to create subscription ({publishing_interval:?}): {message}")]
    SubscriptionFailed {
        /// Requested publishing interval.
        publishing_interval: Duration,
        /// Error message.
        message: String,
    },

    /// Registering a monitored item failed.
    #[error("Failed to register item '{item_id}': {message}")]
    ItemFailed {
        /// The item id.
        item_id: String,
        /// Error message.
        message: String,
    },

    /// The owning session is not connected.
    #[error("Session is not connected")]
    NotConnected,
}

impl RegistrationError {
    /// Creates a subscription failed error.
    pub fn subscription_failed(publishing_interval: Duration, message: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            publishing_interval,
            message: message.into(),
        }
    }

    /// Creates an item failed error.
    pub fn item_failed(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ItemFailed {
            item_id: item_id.into(),
            message: message.into(),
        }
    }

    /// Registration is retried on the next reconnect cycle.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            RegistrationError::SubscriptionFailed { .. } => "subscription_failed",
            RegistrationError::ItemFailed { .. } => "item_failed",
            RegistrationError::NotConnected => "not_connected",
        }
    }
}

// =============================================================================
// TransportError
// =============================================================================

/// Outbound telemetry transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached.
    #[error("Outbound endpoint unreachable: {message}")]
    Unreachable {
        /// Error message.
        message: String,
    },

    /// The endpoint answered with a rejection.
    #[error("Outbound endpoint rejected message (status {status}): {message}")]
    Rejected {
        /// Status code reported by the endpoint.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The send did not complete in time.
    #[error("Outbound send timed out after {duration:?}")]
    Timeout {
        /// The timeout duration.
        duration: Duration,
    },

    /// The message could not be encoded.
    #[error("Failed to encode message: {message}")]
    Encode {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Creates an unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Creates a rejected error.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// Client-side rejections (4xx other than 408/429) and encoding failures
    /// will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Unreachable { .. } | TransportError::Timeout { .. } => true,
            TransportError::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::Encode { .. } => false,
        }
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            TransportError::Unreachable { .. } => "unreachable",
            TransportError::Rejected { .. } => "rejected",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Encode { .. } => "encode",
        }
    }
}

// =============================================================================
// DispatchError
// =============================================================================

/// Errors from the outbound dispatch queue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatch adapter has been shut down.
    #[error("Dispatch queue is closed")]
    Closed,

    /// The dispatch adapter was never started.
    #[error("Dispatch adapter is not running")]
    NotRunning,
}

// =============================================================================
// Result Aliases
// =============================================================================

/// Result alias for root errors.
pub type PublisherResult<T> = Result<T, PublisherError>;

/// Result alias for configuration errors.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result alias for connection errors.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Result alias for registration errors.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Result alias for outbound transport errors.
pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_retryable() {
        assert!(ConnectionError::failed("opc.tcp://a:1", "refused").is_retryable());
        assert!(ConnectionError::timeout("opc.tcp://a:1", Duration::from_secs(1)).is_retryable());
        assert!(ConnectionError::lost("opc.tcp://a:1", "socket closed").is_retryable());
        assert!(!ConnectionError::shutting_down("opc.tcp://a:1").is_retryable());
    }

    #[test]
    fn test_connection_error_endpoint() {
        let error = ConnectionError::lost("opc.tcp://plc:50000", "eof");
        assert_eq!(error.endpoint(), "opc.tcp://plc:50000");
        assert_eq!(error.error_type(), "session_lost");
    }

    #[test]
    fn test_transport_error_retryable() {
        assert!(TransportError::unreachable("dns").is_retryable());
        assert!(TransportError::timeout(Duration::from_secs(3)).is_retryable());
        assert!(TransportError::rejected(503, "busy").is_retryable());
        assert!(TransportError::rejected(429, "slow down").is_retryable());
        assert!(!TransportError::rejected(400, "bad payload").is_retryable());
        assert!(!TransportError::encode("nan").is_retryable());
    }

    #[test]
    fn test_publisher_error_conversion() {
        let error: PublisherError = TransportError::unreachable("down").into();
        assert!(error.is_retryable());
        assert_eq!(error.error_type(), "transport");

        let error: PublisherError = DispatchError::Closed.into();
        assert!(!error.is_retryable());
        assert_eq!(error.error_type(), "dispatch");
    }

    #[test]
    fn test_config_error_duplicate_item() {
        let error =
            ConfigError::duplicate_item("opc.tcp://plc:50000", Duration::from_secs(1), "ns=2;s=A");
        assert_eq!(
            error,
            ConfigError::DuplicateItem {
                endpoint: "opc.tcp://plc:50000".to_string(),
                publishing_interval_ms: 1000,
                item_id: "ns=2;s=A".to_string(),
            }
        );
        assert!(error.to_string().contains("ns=2;s=A"));
    }
}
