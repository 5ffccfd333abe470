// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::collections::{BTreeSet, HashSet};

use opcpub_config::{PublishedNodes, PublisherSettings, SettingsLoader};
use opcpub_core::types::SubscriptionDescriptor;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Counts gathered from a validated configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Distinct device endpoints.
    pub endpoints: usize,
    /// Subscriptions after grouping by publishing interval.
    pub subscriptions: usize,
    /// Monitored items.
    pub items: usize,
    /// Items with a heartbeat.
    pub heartbeat_items: usize,
    /// Items with skip-first.
    pub skip_first_items: usize,
    /// Problems that do not stop the publisher from starting.
    pub warnings: Vec<String>,
}

impl ValidationSummary {
    /// Summarizes resolved descriptors.
    pub fn from_descriptors(descriptors: &[SubscriptionDescriptor]) -> Self {
        let endpoints: BTreeSet<&str> = descriptors.iter().map(|d| d.endpoint.as_str()).collect();
        let items = descriptors.iter().flat_map(|d| d.items.iter());

        let mut warnings = Vec::new();
        for descriptor in descriptors {
            let mut seen = HashSet::new();
            for item in &descriptor.items {
                if !seen.insert(item.item_id.as_str()) {
                    warnings.push(format!(
                        "Duplicate item '{}' on {} at {}ms",
                        item.item_id,
                        descriptor.endpoint,
                        descriptor.publishing_interval.as_millis()
                    ));
                }
                if item.heartbeat_enabled() && item.heartbeat_interval < item.sampling_interval {
                    warnings.push(format!(
                        "Item '{}' has a heartbeat shorter than its sampling interval",
                        item.item_id
                    ));
                }
            }
        }

        Self {
            endpoints: endpoints.len(),
            subscriptions: descriptors.len(),
            items: items.clone().count(),
            heartbeat_items: items.clone().filter(|i| i.heartbeat_enabled()).count(),
            skip_first_items: items.filter(|i| i.skip_first).count(),
            warnings,
        }
    }
}

/// Executes the `validate` command.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let mut settings: PublisherSettings = SettingsLoader::new()
        .load(&cli.config)
        .map_err(|e| BinError::from(e).context("Settings validation failed"))?;
    if let Some(path) = args.nodes {
        settings.nodes.published_nodes_file = path;
    }

    let nodes_file = &settings.nodes.published_nodes_file;
    let nodes = PublishedNodes::load(nodes_file)
        .map_err(|e| BinError::from(e).context("Published nodes validation failed"))?;
    let descriptors = nodes
        .to_descriptors(&settings.nodes)
        .map_err(|e| BinError::from(e).context("Published nodes validation failed"))?;
    let summary = ValidationSummary::from_descriptors(&descriptors);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Settings are valid: {}", cli.config.display());
            println!("✓ Published nodes are valid: {}", nodes_file.display());
            println!();
            println!("Summary:");
            println!("  Product:       {}", settings.publisher.product_info);
            println!("  Endpoints:     {}", summary.endpoints);
            println!("  Subscriptions: {}", summary.subscriptions);
            println!("  Items:         {}", summary.items);
            println!("  Heartbeats:    {}", summary.heartbeat_items);
            println!("  Skip-first:    {}", summary.skip_first_items);
            println!("  Outbound:      {}", settings.dispatch.endpoint_url);

            if !summary.warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &summary.warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_nodes {
                println!();
                for descriptor in &descriptors {
                    println!(
                        "{} @ {}ms",
                        descriptor.endpoint,
                        descriptor.publishing_interval.as_millis()
                    );
                    for item in &descriptor.items {
                        println!(
                            "  - {} (sampling {}ms, heartbeat {}s, skip_first {})",
                            item.item_id,
                            item.sampling_interval.as_millis(),
                            item.heartbeat_interval.as_secs(),
                            item.skip_first
                        );
                    }
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": cli.config.display().to_string(),
                "nodes_path": nodes_file.display().to_string(),
                "summary": {
                    "product_info": settings.publisher.product_info,
                    "endpoints": summary.endpoints,
                    "subscriptions": summary.subscriptions,
                    "items": summary.items,
                    "heartbeat_items": summary.heartbeat_items,
                    "skip_first_items": summary.skip_first_items,
                    "outbound_url": settings.dispatch.endpoint_url,
                },
                "warnings": summary.warnings,
                "subscriptions": if args.show_nodes { Some(&descriptors) } else { None },
            });
            let text = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::render("validation report", e))?;
            println!("{}", text);
        }
    }

    if args.strict && !summary.warnings.is_empty() {
        return Err(BinError::StrictWarnings {
            warnings: summary.warnings.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcpub_core::types::ItemDescriptor;
    use std::time::Duration;

    #[test]
    fn test_summary_counts_and_warnings() {
        let descriptors = vec![
            SubscriptionDescriptor::new("opc.tcp://a:4840", Duration::from_secs(1))
                .with_item(ItemDescriptor::new("ns=2;s=A").with_skip_first(true))
                .with_item(ItemDescriptor::new("ns=2;s=A"))
                .with_item(
                    ItemDescriptor::new("ns=2;s=B")
                        .with_sampling_interval(Duration::from_secs(5))
                        .with_heartbeat_interval(Duration::from_secs(2)),
                ),
            SubscriptionDescriptor::new("opc.tcp://a:4840", Duration::from_millis(200))
                .with_item(ItemDescriptor::new("ns=2;s=A")),
            SubscriptionDescriptor::new("opc.tcp://b:4840", Duration::from_secs(1))
                .with_item(ItemDescriptor::new("ns=2;s=C")),
        ];

        let summary = ValidationSummary::from_descriptors(&descriptors);
        assert_eq!(summary.endpoints, 2);
        assert_eq!(summary.subscriptions, 3);
        assert_eq!(summary.items, 5);
        assert_eq!(summary.heartbeat_items, 1);
        assert_eq!(summary.skip_first_items, 1);
        assert_eq!(summary.warnings.len(), 2);
        assert!(summary.warnings[0].contains("Duplicate item 'ns=2;s=A'"));
    }
}
