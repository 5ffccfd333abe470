// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Published nodes file.
//!
//! The file lists endpoints and the nodes to monitor on each:
//!
//! ```json
//! [
//!   {
//!     "EndpointUrl": "opc.tcp://plc-1:50000",
//!     "UseSecurity": false,
//!     "OpcNodes": [
//!       { "Id": "i=2258;CurrentTime", "OpcSamplingInterval": 500, "OpcPublishingInterval": 1000 },
//!       { "Id": "ns=2;s=ProductName", "DisplayName": "Product", "HeartbeatInterval": 10, "SkipFirst": true }
//!     ]
//!   }
//! ]
//! ```
//!
//! Values a node leaves out come from the `nodes` settings section. Nodes
//! sharing an endpoint and publishing interval end up in one
//! [`SubscriptionDescriptor`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use opcpub_core::error::ConfigError;
use opcpub_core::types::{ItemDescriptor, SubscriptionDescriptor};

use crate::error::{SettingsError, SettingsResult};
use crate::loader::read_file;
use crate::schema::NodesSection;

/// One endpoint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedEndpoint {
    /// Device endpoint URL.
    pub endpoint_url: String,

    /// Whether the session should use a secured channel.
    #[serde(default = "default_use_security")]
    pub use_security: bool,

    /// Nodes to monitor.
    #[serde(default)]
    pub opc_nodes: Vec<PublishedNode>,
}

fn default_use_security() -> bool {
    true
}

/// One node entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedNode {
    /// Node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Expanded node id, used when `Id` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_node_id: Option<String>,

    /// Display name carried on outbound messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Sampling interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opc_sampling_interval: Option<u64>,

    /// Publishing interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opc_publishing_interval: Option<u64>,

    /// Heartbeat interval in seconds; zero disables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,

    /// Suppress the first data change after registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_first: Option<bool>,
}

impl PublishedNode {
    /// The node's identifier, preferring `Id` over `ExpandedNodeId`.
    pub fn node_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.expanded_node_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

// =============================================================================
// PublishedNodes
// =============================================================================

/// Parsed contents of a published nodes file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedNodes {
    endpoints: Vec<PublishedEndpoint>,
}

impl PublishedNodes {
    /// Parses the JSON content of a published nodes file.
    pub fn from_json(content: &str) -> SettingsResult<Self> {
        serde_json::from_str(content).map_err(|e| SettingsError::serialization(e.to_string()))
    }

    /// Reads and parses a published nodes file.
    pub fn load(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref();
        let content = read_file(path)?;
        let nodes = Self::from_json(&content).map_err(|e| match e {
            SettingsError::Serialization { message } => SettingsError::parse(path, message),
            other => other,
        })?;
        info!(
            path = %path.display(),
            endpoints = nodes.endpoints.len(),
            nodes = nodes.node_count(),
            "Published nodes loaded"
        );
        Ok(nodes)
    }

    /// Endpoint entries as written in the file.
    pub fn endpoints(&self) -> &[PublishedEndpoint] {
        &self.endpoints
    }

    /// Total number of node entries.
    pub fn node_count(&self) -> usize {
        self.endpoints.iter().map(|e| e.opc_nodes.len()).sum()
    }

    /// Resolves defaults and groups nodes into subscription descriptors.
    ///
    /// Descriptors keep the order in which their (endpoint, publishing
    /// interval) pair first appears.
    pub fn to_descriptors(&self, defaults: &NodesSection) -> SettingsResult<Vec<SubscriptionDescriptor>> {
        if self.node_count() == 0 {
            return Err(ConfigError::Empty.into());
        }

        let mut descriptors: Vec<SubscriptionDescriptor> = Vec::new();

        for (e, endpoint) in self.endpoints.iter().enumerate() {
            let url = endpoint.endpoint_url.trim();
            if url.is_empty() {
                return Err(SettingsError::validation(format!("[{e}].EndpointUrl"), "cannot be empty"));
            }
            if endpoint.use_security {
                debug!(endpoint = url, "Secured channel requested");
            }

            for (n, node) in endpoint.opc_nodes.iter().enumerate() {
                let item_id = node.node_id().ok_or_else(|| {
                    SettingsError::validation(
                        format!("[{e}].OpcNodes[{n}].Id"),
                        "either Id or ExpandedNodeId is required",
                    )
                })?;

                let publishing_interval = node
                    .opc_publishing_interval
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.default_publishing_interval);
                if publishing_interval.is_zero() {
                    return Err(SettingsError::validation(
                        format!("[{e}].OpcNodes[{n}].OpcPublishingInterval"),
                        "must be greater than 0",
                    ));
                }

                let mut item = ItemDescriptor::new(item_id)
                    .with_sampling_interval(
                        node.opc_sampling_interval
                            .map(Duration::from_millis)
                            .unwrap_or(defaults.default_sampling_interval),
                    )
                    .with_heartbeat_interval(
                        node.heartbeat_interval
                            .map(Duration::from_secs)
                            .unwrap_or(defaults.default_heartbeat_interval),
                    )
                    .with_skip_first(node.skip_first.unwrap_or(defaults.default_skip_first));
                if let Some(name) = node.display_name.as_deref().filter(|n| !n.is_empty()) {
                    item = item.with_display_name(name);
                }

                match descriptors
                    .iter_mut()
                    .find(|d| d.endpoint == url && d.publishing_interval == publishing_interval)
                {
                    Some(descriptor) => descriptor.items.push(item),
                    None => descriptors
                        .push(SubscriptionDescriptor::new(url, publishing_interval).with_item(item)),
                }
            }
        }

        Ok(descriptors)
    }
}

/// Loads a published nodes file and resolves it against `defaults`.
pub fn load_published_nodes(
    path: impl AsRef<Path>,
    defaults: &NodesSection,
) -> SettingsResult<Vec<SubscriptionDescriptor>> {
    PublishedNodes::load(path)?.to_descriptors(defaults)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = r#"[
        {
            "EndpointUrl": "opc.tcp://plc-1:50000",
            "UseSecurity": false,
            "OpcNodes": [
                { "Id": "i=2258;CurrentTime", "OpcSamplingInterval": 500, "OpcPublishingInterval": 500 },
                { "Id": "ns=2;s=ProductName", "DisplayName": "Product", "HeartbeatInterval": 10, "SkipFirst": true },
                { "ExpandedNodeId": "nsu=http://example.com/;s=Speed" }
            ]
        },
        {
            "EndpointUrl": "opc.tcp://plc-2:50000",
            "OpcNodes": [ { "Id": "ns=3;i=1001" } ]
        }
    ]"#;

    #[test]
    fn test_grouping_and_defaults() {
        let nodes = PublishedNodes::from_json(NODES).unwrap();
        assert_eq!(nodes.node_count(), 4);
        assert!(nodes.endpoints()[1].use_security);

        let defaults = NodesSection {
            default_heartbeat_interval: Duration::from_secs(30),
            ..NodesSection::default()
        };
        let descriptors = nodes.to_descriptors(&defaults).unwrap();
        assert_eq!(descriptors.len(), 3);

        let fast = &descriptors[0];
        assert_eq!(fast.endpoint, "opc.tcp://plc-1:50000");
        assert_eq!(fast.publishing_interval, Duration::from_millis(500));
        assert_eq!(fast.items.len(), 1);
        assert_eq!(fast.items[0].sampling_interval, Duration::from_millis(500));

        let standard = &descriptors[1];
        assert_eq!(standard.publishing_interval, Duration::from_millis(1000));
        assert_eq!(standard.items.len(), 2);
        let product = &standard.items[0];
        assert_eq!(product.display_name.as_deref(), Some("Product"));
        assert_eq!(product.heartbeat_interval, Duration::from_secs(10));
        assert!(product.skip_first);
        let speed = &standard.items[1];
        assert_eq!(speed.item_id.as_str(), "nsu=http://example.com/;s=Speed");
        assert_eq!(speed.heartbeat_interval, Duration::from_secs(30));
        assert!(!speed.skip_first);

        assert_eq!(descriptors[2].endpoint, "opc.tcp://plc-2:50000");
    }

    #[test]
    fn test_missing_node_id() {
        let json = r#"[{ "EndpointUrl": "opc.tcp://a:4840", "OpcNodes": [ { "DisplayName": "x" } ] }]"#;
        let result = PublishedNodes::from_json(json)
            .unwrap()
            .to_descriptors(&NodesSection::default());
        assert!(matches!(
            result,
            Err(SettingsError::Validation { ref field, .. }) if field == "[0].OpcNodes[0].Id"
        ));
    }

    #[test]
    fn test_empty_file_is_empty_configuration() {
        let result = PublishedNodes::from_json("[]")
            .unwrap()
            .to_descriptors(&NodesSection::default());
        assert!(matches!(result, Err(SettingsError::Nodes(ConfigError::Empty))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PublishedNodes::from_json("{\"EndpointUrl\": 1}"),
            Err(SettingsError::Serialization { .. })
        ));
    }
}
