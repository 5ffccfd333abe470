// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcpub-config
//!
//! Settings and published nodes loading for opcpub.
//!
//! ## Quick Start
//!
//! ```no_run
//! use opcpub_config::{load_settings, load_published_nodes};
//!
//! let settings = load_settings("opcpub.yaml").unwrap();
//! let descriptors =
//!     load_published_nodes(&settings.nodes.published_nodes_file, &settings.nodes).unwrap();
//!
//! println!("Subscriptions: {}", descriptors.len());
//! ```
//!
//! ## Settings Sections
//!
//! - `publisher` - product identity
//! - `nodes` - published nodes file and per-item defaults
//! - `session` - connect timeout and reconnect backoff
//! - `dispatch` - outbound endpoint, queue and retries
//! - `diagnostics` - periodic counters and Prometheus textfile
//! - `logging` - level and format
//!
//! ## Environment Variables
//!
//! ```text
//! OPCPUB_DISPATCH_ENDPOINT_URL=https://ingest.example.com/telemetry
//! OPCPUB_LOG_LEVEL=debug
//! ```
//!
//! Values in settings files can reference environment variables:
//!
//! ```yaml
//! dispatch:
//!   endpoint_url: "${INGEST_URL:http://localhost:8080/telemetry}"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod published_nodes;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{SettingsError, SettingsResult};
pub use loader::{load_settings, ConfigFormat, SettingsLoader};
pub use published_nodes::{load_published_nodes, PublishedEndpoint, PublishedNode, PublishedNodes};
pub use schema::{
    DiagnosticsSection, DispatchSection, LogFormat, LogLevel, LoggingSection, NodesSection,
    PublisherSection, PublisherSettings, SessionSection,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
