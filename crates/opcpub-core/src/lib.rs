// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcpub-core
//!
//! Core abstractions and shared types for the opcpub telemetry publisher.
//!
//! - **Types**: `ItemId`, `ClientHandle`, `DataValue`, `Notification`, `Message`
//!   and the node descriptors produced by configuration
//! - **Error**: Unified error hierarchy (`PublisherError` and its families)
//! - **Diagnostics**: Consistent-snapshot publisher counters
//! - **Retry**: Backoff strategies for reconnects and outbound sends
//!
//! ## Example
//!
//! ```rust,ignore
//! use opcpub_core::{Diagnostics, ItemDescriptor, SubscriptionDescriptor};
//! use std::time::Duration;
//!
//! let descriptor = SubscriptionDescriptor::new("opc.tcp://plc:50000", Duration::from_secs(1))
//!     .with_item(ItemDescriptor::new("ns=2;s=CurrentTime").with_skip_first(true));
//!
//! let diagnostics = Diagnostics::new();
//! println!("{}", diagnostics.snapshot());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod diagnostics;
pub mod error;
pub mod retry;
pub mod types;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::*;
pub use retry::{ExponentialBackoff, RetryConfig, RetryDecision, RetryStrategy, Retryable};
pub use types::*;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
