// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::info;

use opcpub_config::SettingsLoader;

use crate::cli::{Cli, RunArgs};
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;
use crate::runtime::RuntimeBuilder;

/// Loads settings, initializes logging and runs the publisher until shutdown.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let settings = SettingsLoader::new().load(&cli.config).map_err(|e| {
        BinError::from(e).context(format!("Failed to load settings from {}", cli.config.display()))
    })?;

    let (level, format) = cli.effective_logging(&settings.logging);
    init_logging(level, format);
    info!(config = %cli.config.display(), "Settings loaded");

    let runtime = RuntimeBuilder::new()
        .settings(settings)
        .nodes_path(args.nodes)
        .endpoint_url(args.endpoint_url)
        .build()?;

    runtime.run().await
}
