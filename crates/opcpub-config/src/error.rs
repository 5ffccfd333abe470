// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Settings error types for opcpub-config.
//!
//! Covers reading, parsing and validating the settings file and the
//! published nodes file. Graph-level problems found in the nodes file are
//! carried as [`opcpub_core::ConfigError`].

use std::path::{Path, PathBuf};

use thiserror::Error;

use opcpub_core::error::ConfigError;

/// Settings-related errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to parse a file.
    #[error("Failed to parse '{path}': {message}")]
    Parse {
        /// Path to the file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Parsing in-memory content failed.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// A setting failed validation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Unsupported file format.
    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },

    /// The published nodes do not form a valid graph.
    #[error("Invalid published nodes: {0}")]
    Nodes(#[from] ConfigError),
}

impl SettingsError {
    /// Creates a parse error.
    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl AsRef<Path>) -> Self {
        Self::FileNotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_culprit() {
        let error = SettingsError::validation("dispatch.workers", "must be positive");
        assert_eq!(error.to_string(), "Validation failed for 'dispatch.workers': must be positive");
        assert!(SettingsError::file_not_found("/tmp/x.yaml").to_string().contains("/tmp/x.yaml"));
        assert!(SettingsError::unsupported_format("ini").to_string().contains("ini"));
    }

    #[test]
    fn test_nodes_error_conversion() {
        let error: SettingsError = ConfigError::Empty.into();
        assert!(matches!(error, SettingsError::Nodes(ConfigError::Empty)));
        assert!(error.to_string().contains("no nodes"));
    }
}
