// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: start the publisher (default)
//! - `validate`: check the settings and published nodes files
//! - `version`: show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use opcpub_config::{LogFormat, LogLevel, LoggingSection};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// opcpub - device telemetry publisher
///
/// Subscribes to data points on industrial device servers and forwards
/// their changes and heartbeats to a telemetry endpoint.
#[derive(Parser, Debug)]
#[command(
    name = "opcpub",
    author = "Sylvex <contact@sylvex.io>",
    version = opcpub_core::VERSION,
    about = "Device telemetry publisher",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Settings file path
    #[arg(
        short,
        long,
        default_value = "opcpub.yaml",
        env = "OPCPUB_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the settings file
    #[arg(short, long, env = "OPCPUB_CLI_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the settings file
    #[arg(long, env = "OPCPUB_CLI_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormatArg>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the publisher
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the settings and published nodes files
    ///
    /// Parses both files without connecting to any device.
    Validate(ValidateArgs),

    /// Show version information
    Version,
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Published nodes file; overrides the settings file
    #[arg(short, long)]
    pub nodes: Option<PathBuf>,

    /// Outbound telemetry URL; overrides the settings file
    #[arg(long)]
    pub endpoint_url: Option<String>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Published nodes file; overrides the settings file
    #[arg(short, long)]
    pub nodes: Option<PathBuf>,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Print every resolved subscription
    #[arg(long)]
    pub show_nodes: bool,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Resolves the logging setup: CLI flags win over the settings file.
    ///
    /// An unknown `--log-level` falls back to the settings value.
    pub fn effective_logging(&self, settings: &LoggingSection) -> (LogLevel, LogFormat) {
        let level = self
            .log_level
            .as_deref()
            .and_then(LogLevel::parse)
            .unwrap_or(settings.level);
        let format = self.log_format.map(LogFormat::from).unwrap_or(settings.format);
        (level, format)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["opcpub"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from([
            "opcpub",
            "run",
            "--nodes",
            "/etc/opcpub/nodes.json",
            "--endpoint-url",
            "http://ingest:8080",
        ]);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.nodes, Some(PathBuf::from("/etc/opcpub/nodes.json")));
                assert_eq!(args.endpoint_url.as_deref(), Some("http://ingest:8080"));
            }
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["opcpub", "validate", "--show-nodes", "-f", "json"]);
        match cli.command {
            Some(Commands::Validate(args)) => {
                assert!(args.show_nodes);
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("Expected Validate command, got {:?}", other),
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["opcpub", "-c", "/etc/opcpub/opcpub.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/opcpub/opcpub.toml"));
    }

    #[test]
    fn test_effective_logging() {
        let settings = LoggingSection {
            level: LogLevel::Warn,
            format: LogFormat::Json,
        };

        let cli = Cli::parse_from(["opcpub"]);
        assert_eq!(cli.effective_logging(&settings), (LogLevel::Warn, LogFormat::Json));

        let cli = Cli::parse_from(["opcpub", "-l", "debug", "--log-format", "compact"]);
        assert_eq!(cli.effective_logging(&settings), (LogLevel::Debug, LogFormat::Compact));

        let cli = Cli::parse_from(["opcpub", "-l", "loud"]);
        assert_eq!(cli.effective_logging(&settings).0, LogLevel::Warn);
    }
}
