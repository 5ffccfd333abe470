// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Telemetry Integration Tests
//!
//! End-to-end shaping of device notifications into outbound messages:
//!
//! - Skip-first and heartbeat behavior on a single item
//! - Diagnostics counters against delivered notifications
//! - Silence after shutdown, including with producers blocked on dispatch
//!
//! Every test runs on paused time, so windows are exact.

use std::time::Duration;

use opcpub_dispatch::DispatchConfig;
use opcpub_tests::prelude::*;

const ITEM: &str = "ns=2;s=Temperature";
const MONITOR_TIMEOUT: Duration = Duration::from_secs(5);

async fn started(item: ItemDescriptor) -> TestPublisher {
    started_with(TestPublisher::new().await, item).await
}

async fn started_with(publisher: TestPublisher, item: ItemDescriptor) -> TestPublisher {
    let report = publisher.start_with(NodeFixtures::single(item)).await;
    assert!(report.all_connected());
    assert!(publisher.wait_until_monitored(MONITOR_TIMEOUT).await);
    publisher
}

// =============================================================================
// Data changes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_every_notification_is_emitted_without_skip_first() {
    let publisher = started(ItemFixtures::defaults(ITEM)).await;
    let at_start = publisher.snapshot();

    for n in 0..3 {
        assert_eq!(publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(n)).await, 1);
        publisher.settle(Duration::from_secs(1)).await;
    }
    // 3 notifications inside a 2.5s window
    publisher.settle(Duration::from_millis(500)).await;

    let messages = publisher.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.reason == EmitReason::DataChange));
    assert_eq!(
        messages.iter().map(|m| m.value.clone()).collect::<Vec<_>>(),
        vec![DataValue::Int64(0), DataValue::Int64(1), DataValue::Int64(2)]
    );

    let now = publisher.snapshot();
    assert_eq!(now.events_received - at_start.events_received, 3);
    assert_eq!(now.events_sent, 3);
    assert_eq!(now.send_failures, 0);

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_skip_first_suppresses_only_the_first_notification() {
    let publisher = started(ItemFixtures::skip_first(ITEM)).await;

    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Float64(20.5)).await;
    publisher.settle(Duration::from_secs(1)).await;
    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Float64(21.0)).await;
    publisher.settle(Duration::from_secs(2)).await;

    let messages = publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].value, DataValue::Float64(21.0));

    let snapshot = publisher.snapshot();
    assert_eq!(snapshot.events_received, 2);
    assert_eq!(snapshot.messages_suppressed, 1);
    assert!(publisher.context().registry().item(ITEM).unwrap().first_sample_consumed());

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_messages_carry_identity_and_display_name() {
    let publisher = TestPublisher::builder().product_info("Line7").build().await;
    let publisher = started_with(
        publisher,
        ItemFixtures::defaults(ITEM).with_display_name("Oven temperature"),
    )
    .await;

    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::String("hot".into())).await;
    assert!(publisher.wait_for_messages(1, Duration::from_secs(1)).await);

    let message = &publisher.messages()[0];
    assert_eq!(message.endpoint, FAKE_ENDPOINT);
    assert_eq!(message.item_id.as_str(), ITEM);
    assert_eq!(message.display_name.as_deref(), Some("Oven temperature"));
    assert_eq!(message.product_info, "Line7");
    assert_eq!(publisher.outbound().product_info(), "Line7");

    publisher.shutdown().await;
}

// =============================================================================
// Heartbeats
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_repeats_static_value() {
    let device = std::sync::Arc::new(FakeDeviceTransport::new());
    device.set_initial_value(ITEM, DataValue::Int64(42));
    let publisher = TestPublisher::builder().device(device).build().await;
    let publisher = started_with(publisher, ItemFixtures::heartbeat(ITEM, 2)).await;

    publisher.settle(Duration::from_secs(5)).await;

    assert_eq!(publisher.data_changes().len(), 1);
    let heartbeats = publisher.heartbeats();
    assert_eq!(heartbeats.len(), 2);
    assert!(heartbeats.iter().all(|m| m.value == DataValue::Int64(42)));
    assert_eq!(publisher.snapshot().heartbeats_emitted, 2);

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_period_ignores_data_changes() {
    let publisher = started(ItemFixtures::heartbeat(ITEM, 2)).await;

    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(1)).await;
    publisher.settle(Duration::from_millis(1500)).await;
    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(2)).await;
    publisher.settle(Duration::from_millis(3000)).await;

    // ticks at 2s and 4s, the second change does not shift them
    assert_eq!(publisher.data_changes().len(), 2);
    let heartbeats = publisher.heartbeats();
    assert_eq!(heartbeats.len(), 2);
    assert!(heartbeats.iter().all(|m| m.value == DataValue::Int64(2)));

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_without_any_value_is_silent() {
    let publisher = started(ItemFixtures::heartbeat(ITEM, 1)).await;

    publisher.settle(Duration::from_secs(5)).await;

    assert!(publisher.messages().is_empty());
    assert_eq!(publisher.snapshot().heartbeats_emitted, 0);

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_heartbeat_never_fires() {
    let device = std::sync::Arc::new(FakeDeviceTransport::new());
    device.set_initial_value(ITEM, DataValue::Bool(true));
    let publisher = TestPublisher::builder().device(device).build().await;
    let publisher = started_with(publisher, ItemFixtures::defaults(ITEM)).await;

    publisher.settle(Duration::from_secs(60)).await;

    assert_eq!(publisher.messages().len(), 1);
    assert!(publisher.heartbeats().is_empty());

    publisher.shutdown().await;
}

// =============================================================================
// Static nodes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_static_value_with_defaults_emits_once() {
    let device = std::sync::Arc::new(FakeDeviceTransport::new());
    device.set_initial_value(ITEM, DataValue::String("v1.2.0".into()));
    let publisher = TestPublisher::builder().device(device).build().await;
    let publisher = started_with(publisher, ItemFixtures::defaults(ITEM)).await;

    publisher.settle(Duration::from_secs(3)).await;

    assert_eq!(publisher.messages().len(), 1);
    assert_eq!(publisher.snapshot().events_received, 1);

    let status = publisher.status();
    assert_eq!(status.sessions_configured, 1);
    assert_eq!(status.sessions_connected, 1);
    assert_eq!(status.subscriptions_configured, 1);
    assert_eq!(status.subscriptions_connected, 1);
    assert_eq!(status.items_configured, 1);
    assert_eq!(status.items_monitored, 1);
    assert_eq!(status.items_to_retry, 0);

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_static_value_with_skip_first_emits_nothing() {
    let device = std::sync::Arc::new(FakeDeviceTransport::new());
    device.set_initial_value(ITEM, DataValue::Int64(7));
    let publisher = TestPublisher::builder().device(device).build().await;
    let publisher = started_with(publisher, ItemFixtures::skip_first(ITEM)).await;

    publisher.settle(Duration::from_secs(30)).await;

    assert!(publisher.messages().is_empty());
    let snapshot = publisher.snapshot();
    assert_eq!(snapshot.events_received, 1);
    assert_eq!(snapshot.messages_suppressed, 1);

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_static_value_with_heartbeat_and_skip_first() {
    let device = std::sync::Arc::new(FakeDeviceTransport::new());
    device.set_initial_value(ITEM, DataValue::Int64(7));
    let publisher = TestPublisher::builder().device(device).build().await;
    let publisher = started_with(publisher, ItemFixtures::heartbeat_skip_first(ITEM, 2)).await;

    publisher.settle(Duration::from_secs(5)).await;

    // the suppressed first value still feeds the heartbeat
    let messages = publisher.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.is_heartbeat()));
    assert!(messages.iter().all(|m| m.value == DataValue::Int64(7)));

    publisher.shutdown().await;
}

// =============================================================================
// Reconnect and skip-first
// =============================================================================

async fn reconnect_scenario(rearm: bool) -> TestPublisher {
    let publisher = TestPublisher::builder().rearm_skip_first(rearm).build().await;
    let publisher = started_with(publisher, ItemFixtures::skip_first(ITEM)).await;

    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(1)).await;
    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(2)).await;
    assert!(publisher.wait_for_messages(1, Duration::from_secs(1)).await);

    publisher.device().disconnect(FAKE_ENDPOINT, "network reset").await;
    assert!(publisher.wait_for_connects(FAKE_ENDPOINT, 2, Duration::from_secs(10)).await);
    assert!(publisher.wait_until_monitored(MONITOR_TIMEOUT).await);

    publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(3)).await;
    publisher.settle(Duration::from_secs(1)).await;
    publisher
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_does_not_rearm_skip_first_by_default() {
    let publisher = reconnect_scenario(false).await;

    let values: Vec<_> = publisher.messages().into_iter().map(|m| m.value).collect();
    assert_eq!(values, vec![DataValue::Int64(2), DataValue::Int64(3)]);
    assert_eq!(publisher.context().registry().item(ITEM).unwrap().registrations(), 2);

    publisher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_rearms_skip_first_when_configured() {
    let publisher = reconnect_scenario(true).await;

    let values: Vec<_> = publisher.messages().into_iter().map(|m| m.value).collect();
    assert_eq!(values, vec![DataValue::Int64(2)]);
    assert_eq!(publisher.snapshot().messages_suppressed, 2);

    publisher.shutdown().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_messages_after_shutdown() {
    let device = std::sync::Arc::new(FakeDeviceTransport::new());
    device.set_initial_value(ITEM, DataValue::Int64(1));
    let publisher = TestPublisher::builder().device(device).build().await;
    let publisher = started_with(publisher, ItemFixtures::heartbeat(ITEM, 1)).await;

    publisher.settle(Duration::from_millis(2500)).await;
    publisher.shutdown().await;
    let delivered = publisher.outbound().sent_count();
    assert_eq!(delivered, 3);

    assert_eq!(publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(2)).await, 0);
    publisher.settle(Duration::from_secs(10)).await;

    assert_eq!(publisher.outbound().sent_count(), delivered);
    assert_eq!(publisher.device().session_count(), 0);
    assert_eq!(publisher.status().items_monitored, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_producers_are_blocked_on_dispatch() {
    let outbound = std::sync::Arc::new(RecordingOutboundTransport::new());
    outbound.set_delay(Duration::from_secs(10));
    let config = DispatchConfig::builder()
        .workers(1)
        .queue_capacity(1)
        .send_timeout(Duration::from_secs(60))
        .shutdown_timeout(Duration::from_secs(1))
        .enable_metrics(false)
        .build();
    let publisher = TestPublisher::builder()
        .outbound(std::sync::Arc::clone(&outbound))
        .dispatch_config(config)
        .build()
        .await;
    let publisher = started_with(publisher, ItemFixtures::heartbeat(ITEM, 1)).await;

    // one in flight, one queued, the pump waits on the third
    for n in 0..3 {
        publisher.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(n)).await;
    }
    // the first heartbeat waits behind it
    publisher.settle(Duration::from_millis(1500)).await;
    assert_eq!(publisher.snapshot().events_received, 3);
    assert_eq!(publisher.context().dispatcher().queue_depth(), 2);

    publisher.shutdown().await;

    let snapshot = publisher.snapshot();
    assert_eq!(snapshot.messages_enqueued, 2);
    assert_eq!(snapshot.events_sent + snapshot.send_failures, snapshot.messages_enqueued);
    assert_eq!(snapshot.heartbeats_emitted, 0);
    assert_eq!(snapshot.in_flight(), 0);
    assert_eq!(publisher.context().dispatcher().queue_depth(), 0);

    let delivered = outbound.sent_count();
    publisher.settle(Duration::from_secs(30)).await;
    assert_eq!(outbound.sent_count(), delivered);
    assert_eq!(publisher.device().session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_independent_publishers_do_not_share_counters() {
    let first = started(ItemFixtures::defaults(ITEM)).await;
    let second = started(ItemFixtures::defaults(ITEM)).await;

    first.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(1)).await;
    first.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(2)).await;
    second.device().push(FAKE_ENDPOINT, ITEM, DataValue::Int64(3)).await;
    first.settle(Duration::from_secs(1)).await;

    assert_eq!(first.snapshot().events_received, 2);
    assert_eq!(second.snapshot().events_received, 1);
    assert_eq!(first.messages().len(), 2);
    assert_eq!(second.messages().len(), 1);

    first.shutdown().await;
    assert_eq!(second.status().items_monitored, 1);
    second.shutdown().await;
}
