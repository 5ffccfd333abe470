// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcpub-bin
//!
//! Command-line runtime for the opcpub telemetry publisher.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                              │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └──────────┘ └────┬─────┘ └──────────┘
//!                          │
//!               ┌──────────┼──────────┐
//!               ▼                     ▼
//!        ┌─────────────┐     ┌────────────────┐
//!        │  shutdown   │     │ PublisherContext│
//!        └─────────────┘     │  (opcpub-opcua) │
//!                            └────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the publisher (default command)
//! opcpub
//!
//! # Start with a custom settings file
//! opcpub -c /etc/opcpub/opcpub.yaml run
//!
//! # Check settings and the published nodes file
//! opcpub validate
//!
//! # Show version
//! opcpub version
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{PublisherRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownListener};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
