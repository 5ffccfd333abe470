// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built item and subscription descriptors plus settings and published
//! nodes documents.

use std::io::Write;
use std::time::Duration;

use opcpub_core::types::{ItemDescriptor, SubscriptionDescriptor};
use tempfile::NamedTempFile;

/// Endpoint served by the fake device in most tests.
pub const FAKE_ENDPOINT: &str = "opc.tcp://fake-plc:4840";

/// A second endpoint for multi-session tests.
pub const SECOND_ENDPOINT: &str = "opc.tcp://fake-plc-2:4840";

/// Publishing interval used by the fixtures.
pub const DEFAULT_PUBLISHING_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Item Fixtures
// =============================================================================

/// Item descriptor fixtures.
pub struct ItemFixtures;

impl ItemFixtures {
    /// An item with every option at its default.
    pub fn defaults(item_id: &str) -> ItemDescriptor {
        ItemDescriptor::new(item_id)
    }

    /// An item that drops its first sample.
    pub fn skip_first(item_id: &str) -> ItemDescriptor {
        ItemDescriptor::new(item_id).with_skip_first(true)
    }

    /// An item with a heartbeat of `secs` seconds.
    pub fn heartbeat(item_id: &str, secs: u64) -> ItemDescriptor {
        ItemDescriptor::new(item_id).with_heartbeat_interval(Duration::from_secs(secs))
    }

    /// An item with both a heartbeat and skip-first.
    pub fn heartbeat_skip_first(item_id: &str, secs: u64) -> ItemDescriptor {
        Self::heartbeat(item_id, secs).with_skip_first(true)
    }

    /// `count` default items named `ns=2;s=Tag{n}`.
    pub fn batch(count: usize) -> Vec<ItemDescriptor> {
        (0..count)
            .map(|n| ItemDescriptor::new(format!("ns=2;s=Tag{}", n)))
            .collect()
    }
}

// =============================================================================
// Node Fixtures
// =============================================================================

/// Subscription descriptor fixtures.
pub struct NodeFixtures;

impl NodeFixtures {
    /// One item on [`FAKE_ENDPOINT`].
    pub fn single(item: ItemDescriptor) -> Vec<SubscriptionDescriptor> {
        Self::on(FAKE_ENDPOINT, vec![item])
    }

    /// Several items sharing one subscription on `endpoint`.
    pub fn on(endpoint: &str, items: Vec<ItemDescriptor>) -> Vec<SubscriptionDescriptor> {
        vec![items.into_iter().fold(
            SubscriptionDescriptor::new(endpoint, DEFAULT_PUBLISHING_INTERVAL),
            |descriptor, item| descriptor.with_item(item),
        )]
    }

    /// Items on [`FAKE_ENDPOINT`] and [`SECOND_ENDPOINT`].
    pub fn two_endpoints(
        first: Vec<ItemDescriptor>,
        second: Vec<ItemDescriptor>,
    ) -> Vec<SubscriptionDescriptor> {
        let mut descriptors = Self::on(FAKE_ENDPOINT, first);
        descriptors.extend(Self::on(SECOND_ENDPOINT, second));
        descriptors
    }
}

// =============================================================================
// Document Fixtures
// =============================================================================

/// Settings and published nodes documents.
pub struct DocumentFixtures;

impl DocumentFixtures {
    /// Settings in YAML.
    pub fn settings_yaml() -> &'static str {
        r#"
publisher:
  product_info: "LineSevenPublisher"

nodes:
  published_nodes_file: "publishednodes.json"
  default_heartbeat_interval: 0
  default_skip_first: false
  default_sampling_interval: 500
  default_publishing_interval: 1000

session:
  connect_timeout: 5000
  rearm_skip_first_on_reconnect: false

dispatch:
  endpoint_url: "http://collector.local:8080/telemetry"
  queue_capacity: 256
  workers: 2
  max_send_attempts: 5

diagnostics:
  interval: 30
  enable_metrics: false

logging:
  level: debug
  format: json
"#
    }

    /// Settings in TOML.
    pub fn settings_toml() -> &'static str {
        r#"
[publisher]
product_info = "LineSevenPublisher"

[nodes]
published_nodes_file = "publishednodes.json"
default_skip_first = true

[dispatch]
endpoint_url = "http://collector.local:8080/telemetry"
workers = 3

[diagnostics]
interval = 0
"#
    }

    /// Settings in JSON.
    pub fn settings_json() -> &'static str {
        r#"{
  "publisher": { "product_info": "LineSevenPublisher" },
  "nodes": { "default_heartbeat_interval": 10 },
  "session": { "rearm_skip_first_on_reconnect": true },
  "logging": { "level": "warn", "format": "compact" }
}"#
    }

    /// A published nodes document with two endpoints and two intervals.
    pub fn published_nodes_json() -> &'static str {
        r#"[
  {
    "EndpointUrl": "opc.tcp://fake-plc:4840",
    "UseSecurity": false,
    "OpcNodes": [
      { "Id": "ns=2;s=Temperature", "DisplayName": "Oven temperature", "HeartbeatInterval": 2 },
      { "Id": "ns=2;s=Pressure", "SkipFirst": true },
      { "ExpandedNodeId": "nsu=http://line7;s=Speed", "OpcPublishingInterval": 250 }
    ]
  },
  {
    "EndpointUrl": "opc.tcp://fake-plc-2:4840",
    "OpcNodes": [
      { "Id": "ns=3;i=1001", "OpcSamplingInterval": 100 }
    ]
  }
]"#
    }

    /// Writes `content` to a temp file with the given suffix.
    pub fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write temp file");
        file
    }
}
