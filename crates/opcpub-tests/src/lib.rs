// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcpub Integration Tests
//!
//! Test utilities and end-to-end tests for the opcpub publisher.
//!
//! ## Module Structure
//!
//! - [`common`]: shared test utilities
//!   - `fixtures`: node descriptors and settings files
//!   - `mocks`: scriptable device transport and recording outbound transport
//!   - `harness`: a fully wired publisher driven by the fake transports
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p opcpub-tests
//! cargo test -p opcpub-tests --test integration_telemetry
//! cargo test -p opcpub-tests --test integration_registry
//! cargo test -p opcpub-tests --test integration_dispatch
//! cargo test -p opcpub-tests --test integration_config
//! ```
//!
//! ## Test Categories
//!
//! ### Telemetry (`integration_telemetry.rs`)
//! - Skip-first and heartbeat shaping end to end
//! - Diagnostics counters against delivered notifications
//! - Silence after shutdown
//!
//! ### Registry (`integration_registry.rs`)
//! - Start reports, reconnect and re-registration
//! - Per-item registration faults
//! - Independent contexts in one process
//!
//! ### Dispatch (`integration_dispatch.rs`)
//! - Retries, failure accounting and per-item ordering
//!
//! ### Config (`integration_config.rs`)
//! - Settings files in every format and published nodes resolution
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use opcpub_tests::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let publisher = TestPublisher::new().await;
//!     publisher.start_with(NodeFixtures::single(ItemFixtures::defaults("ns=2;s=A"))).await;
//!     publisher.device().push(FAKE_ENDPOINT, "ns=2;s=A", DataValue::Int64(1)).await;
//!     // ...
//!     publisher.shutdown().await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use opcpub_core::types::{DataValue, EmitReason, ItemDescriptor, SubscriptionDescriptor};
}
