// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Config Integration Tests
//!
//! Settings files in every supported format, published nodes resolution,
//! and loading the resolved descriptors into a running publisher.

use std::fs;
use std::time::Duration;

use opcpub_config::{
    load_published_nodes, ConfigFormat, LogFormat, LogLevel, PublishedNodes, SettingsError, SettingsLoader,
};
use opcpub_core::error::ConfigError;
use opcpub_tests::common::temp_test_dir;
use opcpub_tests::prelude::*;

fn loader() -> SettingsLoader {
    // isolated prefix so parallel tests never see each other's overrides
    SettingsLoader::new().with_env_prefix("OPCPUB_ITEST_UNSET")
}

// =============================================================================
// Settings files
// =============================================================================

#[test]
fn test_settings_yaml_file() {
    let file = DocumentFixtures::write_temp(DocumentFixtures::settings_yaml(), ".yaml");
    let settings = loader().load(file.path()).expect("yaml settings should load");

    assert_eq!(settings.publisher.product_info, "LineSevenPublisher");
    assert_eq!(settings.nodes.default_sampling_interval, Duration::from_millis(500));
    assert_eq!(settings.session.connect_timeout, Duration::from_secs(5));
    assert_eq!(settings.dispatch.queue_capacity, 256);
    assert_eq!(settings.dispatch.max_send_attempts, 5);
    assert_eq!(settings.diagnostics.interval, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LogLevel::Debug);
    assert_eq!(settings.logging.format, LogFormat::Json);

    // relative to the settings file
    let parent = file.path().parent().unwrap();
    assert_eq!(settings.nodes.published_nodes_file, parent.join("publishednodes.json"));
}

#[test]
fn test_settings_toml_file() {
    let file = DocumentFixtures::write_temp(DocumentFixtures::settings_toml(), ".toml");
    let settings = loader().load(file.path()).expect("toml settings should load");

    assert!(settings.nodes.default_skip_first);
    assert_eq!(settings.dispatch.workers, 3);
    assert!(!settings.diagnostics.is_enabled());
    assert_eq!(settings.logging.level, LogLevel::Info);
}

#[test]
fn test_settings_json_file() {
    let file = DocumentFixtures::write_temp(DocumentFixtures::settings_json(), ".json");
    let settings = loader().load(file.path()).expect("json settings should load");

    assert_eq!(settings.nodes.default_heartbeat_interval, Duration::from_secs(10));
    assert!(settings.session.rearm_skip_first_on_reconnect);
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert_eq!(settings.dispatch.endpoint_url, "http://localhost:8080/telemetry");
}

#[test]
fn test_settings_formats_agree() {
    let yaml = loader()
        .load_from_str("publisher:\n  product_info: Same\n", ConfigFormat::Yaml)
        .unwrap();
    let toml = loader()
        .load_from_str("[publisher]\nproduct_info = \"Same\"\n", ConfigFormat::Toml)
        .unwrap();
    let json = loader()
        .load_from_str(r#"{"publisher":{"product_info":"Same"}}"#, ConfigFormat::Json)
        .unwrap();

    assert_eq!(yaml, toml);
    assert_eq!(toml, json);
}

#[test]
fn test_settings_errors() {
    let missing = loader().load("/nonexistent/opcpub.yaml");
    assert!(matches!(missing, Err(SettingsError::FileNotFound { .. })));

    let unsupported = DocumentFixtures::write_temp("x = 1", ".ini");
    assert!(matches!(
        loader().load(unsupported.path()),
        Err(SettingsError::UnsupportedFormat { .. })
    ));

    let broken = DocumentFixtures::write_temp("{ not json", ".json");
    assert!(matches!(loader().load(broken.path()), Err(SettingsError::Parse { .. })));

    let invalid = DocumentFixtures::write_temp(r#"{"dispatch":{"workers":0}}"#, ".json");
    assert!(matches!(loader().load(invalid.path()), Err(SettingsError::Validation { .. })));
}

#[test]
fn test_settings_env_override() {
    std::env::set_var("OPCPUB_ITEST_OVR_PRODUCT_INFO", "FromEnv");
    std::env::set_var("OPCPUB_ITEST_OVR_REARM_SKIP_FIRST", "yes");

    let file = DocumentFixtures::write_temp(DocumentFixtures::settings_yaml(), ".yaml");
    let settings = SettingsLoader::new()
        .with_env_prefix("OPCPUB_ITEST_OVR")
        .load(file.path())
        .unwrap();

    assert_eq!(settings.publisher.product_info, "FromEnv");
    assert!(settings.session.rearm_skip_first_on_reconnect);

    std::env::remove_var("OPCPUB_ITEST_OVR_PRODUCT_INFO");
    std::env::remove_var("OPCPUB_ITEST_OVR_REARM_SKIP_FIRST");
}

// =============================================================================
// Published nodes
// =============================================================================

#[test]
fn test_published_nodes_resolution() {
    let settings = loader()
        .load_from_str("nodes:\n  default_skip_first: false\n", ConfigFormat::Yaml)
        .unwrap();
    let nodes = PublishedNodes::from_json(DocumentFixtures::published_nodes_json()).unwrap();
    assert_eq!(nodes.endpoints().len(), 2);
    assert_eq!(nodes.node_count(), 4);

    let descriptors = nodes.to_descriptors(&settings.nodes).unwrap();
    assert_eq!(descriptors.len(), 3);

    // first endpoint, default publishing interval
    assert_eq!(descriptors[0].endpoint, FAKE_ENDPOINT);
    assert_eq!(descriptors[0].publishing_interval, Duration::from_millis(1000));
    assert_eq!(descriptors[0].items.len(), 2);
    let temperature = &descriptors[0].items[0];
    assert_eq!(temperature.display_name.as_deref(), Some("Oven temperature"));
    assert_eq!(temperature.heartbeat_interval, Duration::from_secs(2));
    assert!(!temperature.skip_first);
    assert!(descriptors[0].items[1].skip_first);

    // first endpoint, overridden publishing interval
    assert_eq!(descriptors[1].endpoint, FAKE_ENDPOINT);
    assert_eq!(descriptors[1].publishing_interval, Duration::from_millis(250));
    assert_eq!(descriptors[1].items[0].item_id.as_str(), "nsu=http://line7;s=Speed");

    assert_eq!(descriptors[2].endpoint, SECOND_ENDPOINT);
    assert_eq!(descriptors[2].items[0].sampling_interval, Duration::from_millis(100));
}

#[test]
fn test_published_nodes_defaults_apply() {
    let settings = loader()
        .load_from_str(
            "nodes:\n  default_skip_first: true\n  default_heartbeat_interval: 30\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
    let descriptors = PublishedNodes::from_json(
        r#"[{"EndpointUrl":"opc.tcp://fake-plc:4840","OpcNodes":[{"Id":"a"},{"Id":"b","SkipFirst":false}]}]"#,
    )
    .unwrap()
    .to_descriptors(&settings.nodes)
    .unwrap();

    let items = &descriptors[0].items;
    assert!(items[0].skip_first);
    assert!(!items[1].skip_first);
    assert!(items.iter().all(|i| i.heartbeat_interval == Duration::from_secs(30)));
}

#[test]
fn test_published_nodes_errors() {
    let defaults = opcpub_config::NodesSection::default();

    let empty = PublishedNodes::from_json("[]").unwrap().to_descriptors(&defaults);
    assert!(matches!(empty, Err(SettingsError::Nodes(ConfigError::Empty))));

    let no_id = PublishedNodes::from_json(r#"[{"EndpointUrl":"opc.tcp://x:1","OpcNodes":[{"DisplayName":"?"}]}]"#)
        .unwrap()
        .to_descriptors(&defaults);
    match no_id {
        Err(SettingsError::Validation { field, .. }) => assert_eq!(field, "[0].OpcNodes[0].Id"),
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(PublishedNodes::from_json("{}").is_err());
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_files_drive_a_running_publisher() {
    let dir = temp_test_dir("opcpub-config-");
    fs::write(dir.path().join("opcpub.yaml"), DocumentFixtures::settings_yaml()).unwrap();
    fs::write(
        dir.path().join("publishednodes.json"),
        DocumentFixtures::published_nodes_json(),
    )
    .unwrap();

    let settings = loader().load(dir.path().join("opcpub.yaml")).unwrap();
    let descriptors = load_published_nodes(&settings.nodes.published_nodes_file, &settings.nodes).unwrap();

    let publisher = TestPublisher::builder()
        .product_info(settings.publisher.product_info.clone())
        .build()
        .await;
    let report = publisher.start_with(descriptors).await;
    assert!(report.all_connected());
    assert!(publisher.wait_until_monitored(Duration::from_secs(5)).await);

    let status = publisher.status();
    assert_eq!(status.sessions_configured, 2);
    assert_eq!(status.subscriptions_configured, 3);
    assert_eq!(status.items_monitored, 4);

    publisher
        .device()
        .push(FAKE_ENDPOINT, "ns=2;s=Temperature", DataValue::Float64(180.0))
        .await;
    publisher.settle(Duration::from_secs(5)).await;

    // one data change, heartbeats at 2s and 4s
    let messages = publisher.messages_for("ns=2;s=Temperature");
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.product_info == "LineSevenPublisher"));
    assert_eq!(messages[0].display_name.as_deref(), Some("Oven temperature"));

    publisher.shutdown().await;
}
