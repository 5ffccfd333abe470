// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Prints version information for every component.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("opcpub - device telemetry publisher");
    println!();
    println!("Version Information:");
    println!("  opcpub-bin:      {}", crate::VERSION);
    println!("  opcpub-core:     {}", opcpub_core::VERSION);
    println!("  opcpub-opcua:    {}", opcpub_opcua::VERSION);
    println!("  opcpub-dispatch: {}", opcpub_dispatch::VERSION);
    println!("  opcpub-config:   {}", opcpub_config::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:          {}", std::env::consts::ARCH);
    println!("  OS:              {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
