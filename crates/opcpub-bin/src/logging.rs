// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use opcpub_config::{LogFormat, LogLevel};

/// Initializes the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Returns `false` if a subscriber
/// was already installed.
///
/// ```ignore
/// use opcpub_bin::logging::init_logging;
/// use opcpub_config::{LogFormat, LogLevel};
///
/// init_logging(LogLevel::Info, LogFormat::Text);
/// ```
pub fn init_logging(level: LogLevel, format: LogFormat) -> bool {
    let filter = build_filter(level);

    match format {
        LogFormat::Text => {
            let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_ansi(is_terminal))
                .try_init()
                .is_ok()
        }
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .is_ok(),
        LogFormat::Compact => {
            let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_target(false).with_ansi(is_terminal))
                .try_init()
                .is_ok()
        }
    }
}

fn build_filter(level: LogLevel) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    ["hyper=warn", "reqwest=warn", "rustls=warn"]
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}
