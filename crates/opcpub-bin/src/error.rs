// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors surfaced by the `opcpub` commands and how they map to exit codes.

use std::path::PathBuf;

use thiserror::Error;

use opcpub_config::SettingsError;
use opcpub_core::error::PublisherError;

/// Result alias for the commands.
pub type BinResult<T> = Result<T, BinError>;

/// Exit code for bad settings, published nodes or arguments.
pub const EXIT_CONFIG: i32 = 1;
/// Exit code for a publisher that failed to start or stopped abnormally.
pub const EXIT_PUBLISHER: i32 = 2;
/// Exit code for local file or rendering failures.
pub const EXIT_IO: i32 = 3;

/// Errors reported by the `opcpub` commands.
#[derive(Debug, Error)]
pub enum BinError {
    /// The runtime was built without settings.
    #[error("No settings provided")]
    MissingSettings,

    /// `validate --strict` found warnings.
    #[error("Strict mode: {warnings} warning(s) found")]
    StrictWarnings {
        /// Number of warnings.
        warnings: usize,
    },

    /// Settings or published nodes could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The publisher failed to start or run.
    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),

    /// The diagnostics textfile could not be written.
    #[error("Cannot write {}: {source}", path.display())]
    Textfile {
        /// The textfile path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Metrics or command output could not be rendered.
    #[error("Failed to render {what}: {reason}")]
    Render {
        /// What was being rendered.
        what: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// An error with a description of the failed step.
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a rendering error.
    pub fn render(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Render {
            what,
            reason: reason.to_string(),
        }
    }

    /// Wraps the error with a description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Process exit code. Context wrappers report their innermost cause.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingSettings | Self::StrictWarnings { .. } | Self::Settings(_) => EXIT_CONFIG,
            Self::Publisher(PublisherError::Config(_)) => EXIT_CONFIG,
            Self::Publisher(_) => EXIT_PUBLISHER,
            Self::Textfile { .. } | Self::Render { .. } => EXIT_IO,
            Self::Context { source, .. } => source.exit_code(),
        }
    }
}

/// Prints the error and its causes to stderr, then exits.
pub fn report_error_and_exit(error: BinError) -> ! {
    eprintln!("Error: {}", error);
    let mut cause = std::error::Error::source(&error);
    while let Some(inner) = cause {
        eprintln!("  Caused by: {}", inner);
        cause = inner.source();
    }
    std::process::exit(error.exit_code())
}
