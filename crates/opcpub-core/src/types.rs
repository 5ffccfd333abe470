// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for opcpub.
//!
//! These types cross every boundary in the publisher: descriptors come in from
//! configuration, notifications come in from the device transport, and
//! messages go out to the outbound transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// The node identifier of a monitored data point, e.g. `ns=2;s=CurrentTime`.
///
/// # Examples
///
/// ```
/// use opcpub_core::types::ItemId;
///
/// let id = ItemId::new("ns=2;s=CurrentTime");
/// assert_eq!(id.as_str(), "ns=2;s=CurrentTime");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new item ID.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Client-assigned handle of a monitored item.
///
/// Assigned once when the configuration is loaded and stable across
/// reconnects. Device transports echo it back on every notification so the
/// pipeline can route without string lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientHandle(pub u32);

impl ClientHandle {
    /// Returns the raw handle value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mi-{}", self.0)
    }
}

impl From<u32> for ClientHandle {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value reported by a device.
///
/// Serialized untagged so the outbound payload carries plain JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int64(i64),
    /// Unsigned integer.
    UInt64(u64),
    /// Floating point.
    Float64(f64),
    /// Date and time.
    DateTime(DateTime<Utc>),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Null / bad quality value.
    Null,
}

impl DataValue {
    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Bool(_) => "bool",
            DataValue::Int64(_) => "int64",
            DataValue::UInt64(_) => "uint64",
            DataValue::Float64(_) => "float64",
            DataValue::DateTime(_) => "datetime",
            DataValue::String(_) => "string",
            DataValue::Bytes(_) => "bytes",
            DataValue::Null => "null",
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Attempts to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            DataValue::Int64(v) => Some(*v as f64),
            DataValue::UInt64(v) => Some(*v as f64),
            DataValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to view this value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Bool(v) => write!(f, "{}", v),
            DataValue::Int64(v) => write!(f, "{}", v),
            DataValue::UInt64(v) => write!(f, "{}", v),
            DataValue::Float64(v) => write!(f, "{}", v),
            DataValue::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            DataValue::String(v) => write!(f, "{}", v),
            DataValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            DataValue::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int64(v)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float64(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::String(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::String(v)
    }
}

impl From<DateTime<Utc>> for DataValue {
    fn from(v: DateTime<Utc>) -> Self {
        DataValue::DateTime(v)
    }
}

// =============================================================================
// Notification
// =============================================================================

/// A raw value-change event delivered by the device transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Handle of the item this notification belongs to.
    pub client_handle: ClientHandle,
    /// Node identifier, as reported by the transport.
    pub item_id: ItemId,
    /// The new value.
    pub value: DataValue,
    /// Timestamp assigned by the data source.
    pub source_timestamp: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification stamped with the current time.
    pub fn new(client_handle: ClientHandle, item_id: impl Into<ItemId>, value: DataValue) -> Self {
        Self {
            client_handle,
            item_id: item_id.into(),
            value,
            source_timestamp: Utc::now(),
        }
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = timestamp;
        self
    }
}

// =============================================================================
// Message
// =============================================================================

/// Why a message was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitReason {
    /// A data-change notification passed the item's shaping rules.
    DataChange,
    /// The item's heartbeat timer re-emitted the last known value.
    Heartbeat,
}

impl fmt::Display for EmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitReason::DataChange => write!(f, "data_change"),
            EmitReason::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// A shaped outbound telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id (time-ordered).
    pub id: Uuid,
    /// Endpoint of the session the item belongs to.
    pub endpoint: String,
    /// Node identifier.
    pub item_id: ItemId,
    /// Optional display name from configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The emitted value.
    pub value: DataValue,
    /// Source timestamp of the value.
    pub source_timestamp: DateTime<Utc>,
    /// When this message was constructed.
    pub timestamp: DateTime<Utc>,
    /// Emission reason.
    pub reason: EmitReason,
    /// Product identity tag, filled in by the dispatch adapter.
    #[serde(default)]
    pub product_info: String,
}

impl Message {
    /// Creates a new message timestamped now.
    pub fn new(
        endpoint: impl Into<String>,
        item_id: ItemId,
        value: DataValue,
        source_timestamp: DateTime<Utc>,
        reason: EmitReason,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            endpoint: endpoint.into(),
            item_id,
            display_name: None,
            value,
            source_timestamp,
            timestamp: Utc::now(),
            reason,
            product_info: String::new(),
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    /// Returns `true` if this is a heartbeat message.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.reason == EmitReason::Heartbeat
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Configuration of one monitored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Node identifier.
    pub item_id: ItemId,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Requested sampling interval.
    #[serde(with = "duration_millis", default = "default_sampling_interval")]
    pub sampling_interval: Duration,
    /// Heartbeat interval; zero disables heartbeats.
    #[serde(with = "duration_millis", default)]
    pub heartbeat_interval: Duration,
    /// Suppress the first data-change after registration.
    #[serde(default)]
    pub skip_first: bool,
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(1000)
}

impl ItemDescriptor {
    /// Creates an item descriptor with default shaping.
    pub fn new(item_id: impl Into<ItemId>) -> Self {
        Self {
            item_id: item_id.into(),
            display_name: None,
            sampling_interval: default_sampling_interval(),
            heartbeat_interval: Duration::ZERO,
            skip_first: false,
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the sampling interval.
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets skip-first.
    pub fn with_skip_first(mut self, skip_first: bool) -> Self {
        self.skip_first = skip_first;
        self
    }

    /// Returns `true` if heartbeats are enabled.
    #[inline]
    pub fn heartbeat_enabled(&self) -> bool {
        !self.heartbeat_interval.is_zero()
    }
}

/// A group of items on one endpoint sharing a publishing interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    /// Device endpoint URL.
    pub endpoint: String,
    /// Publishing interval of the subscription.
    #[serde(with = "duration_millis")]
    pub publishing_interval: Duration,
    /// Items of the subscription.
    pub items: Vec<ItemDescriptor>,
}

impl SubscriptionDescriptor {
    /// Creates an empty subscription descriptor.
    pub fn new(endpoint: impl Into<String>, publishing_interval: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            publishing_interval,
            items: Vec::new(),
        }
    }

    /// Adds an item.
    pub fn with_item(mut self, item: ItemDescriptor) -> Self {
        self.items.push(item);
        self
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

/// Serializes a `Duration` as integer milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes the duration.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    /// Deserializes the duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serializes a `Duration` as integer seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes the duration.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    /// Deserializes the duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_handle_display() {
        assert_eq!(ClientHandle(7).to_string(), "mi-7");
        assert_eq!(ClientHandle::from(3).value(), 3);
    }

    #[test]
    fn test_data_value_untagged_json() {
        let json = serde_json::to_value(DataValue::Float64(21.5)).unwrap();
        assert_eq!(json, serde_json::json!(21.5));

        let json = serde_json::to_value(DataValue::from("OpcPlc")).unwrap();
        assert_eq!(json, serde_json::json!("OpcPlc"));

        assert_eq!(DataValue::Int64(4).as_f64(), Some(4.0));
        assert!(DataValue::Null.is_null());
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::new(
            "opc.tcp://plc:50000",
            ItemId::new("ns=2;s=ProductName"),
            DataValue::from("OpcPlc"),
            Utc::now(),
            EmitReason::Heartbeat,
        )
        .with_display_name(Some("Product".to_string()));

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["reason"], "heartbeat");
        assert_eq!(json["item_id"], "ns=2;s=ProductName");
        assert_eq!(json["display_name"], "Product");
        assert!(msg.is_heartbeat());
    }

    #[test]
    fn test_item_descriptor_defaults() {
        let item: ItemDescriptor =
            serde_json::from_str(r#"{"item_id": "ns=2;s=CurrentTime"}"#).unwrap();
        assert_eq!(item.sampling_interval, Duration::from_millis(1000));
        assert_eq!(item.heartbeat_interval, Duration::ZERO);
        assert!(!item.skip_first);
        assert!(!item.heartbeat_enabled());

        let item = item.with_heartbeat_interval(Duration::from_secs(2));
        assert!(item.heartbeat_enabled());
    }
}
