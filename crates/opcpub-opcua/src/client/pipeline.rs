// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Notification pipeline.
//!
//! Routes raw notifications and heartbeat ticks to their monitored item,
//! turns every emit decision into a [`Message`] and hands it to the
//! dispatch adapter.
//!
//! ```text
//!  session pump ──Notification──┐
//!                               ├──▶ MonitoredItem ──Emit──▶ Message ──▶ DispatchAdapter
//!  heartbeat worker ──Tick──────┘         │
//!                                         └──Suppress──▶ messages_suppressed
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use opcpub_core::diagnostics::Diagnostics;
use opcpub_core::types::{ClientHandle, Message, Notification};
use opcpub_dispatch::DispatchAdapter;

use super::heartbeat::HeartbeatTick;
use super::item::{EmitDecision, Emission, MonitoredItem};

/// Routes events to items and emitted messages to dispatch.
pub struct NotificationPipeline {
    items: DashMap<ClientHandle, Arc<MonitoredItem>>,
    diagnostics: Arc<Diagnostics>,
    dispatcher: Arc<DispatchAdapter>,
    closed: AtomicBool,
}

impl NotificationPipeline {
    /// Creates an empty pipeline.
    pub fn new(diagnostics: Arc<Diagnostics>, dispatcher: Arc<DispatchAdapter>) -> Self {
        Self {
            items: DashMap::new(),
            diagnostics,
            dispatcher,
            closed: AtomicBool::new(false),
        }
    }

    /// Makes `item` reachable by its client handle.
    pub fn insert(&self, item: Arc<MonitoredItem>) {
        self.items.insert(item.handle(), item);
    }

    /// Removes the item with `handle`.
    pub fn remove(&self, handle: ClientHandle) -> Option<Arc<MonitoredItem>> {
        self.items.remove(&handle).map(|(_, item)| item)
    }

    /// Removes every item.
    pub fn clear(&self) {
        self.items.clear();
    }

    /// Number of routable items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no item is routable.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an item.
    pub fn get(&self, handle: ClientHandle) -> Option<Arc<MonitoredItem>> {
        self.items.get(&handle).map(|entry| Arc::clone(entry.value()))
    }

    /// Handles one raw notification from a device session.
    ///
    /// Every notification counts as received, even when its handle is
    /// unknown or the item suppresses it.
    pub async fn dispatch(&self, notification: Notification) {
        if self.is_closed() {
            return;
        }
        self.diagnostics.increment_received();

        let Some(item) = self.get(notification.client_handle) else {
            self.diagnostics.increment_suppressed();
            debug!(
                handle = %notification.client_handle,
                item_id = %notification.item_id,
                "Notification for unknown client handle"
            );
            return;
        };

        match item.on_notification(notification.value, notification.source_timestamp) {
            EmitDecision::Emit(emission) => self.forward(&item, emission).await,
            EmitDecision::Suppress(reason) => {
                self.diagnostics.increment_suppressed();
                trace!(item_id = %item.item_id(), reason = ?reason, "Notification suppressed");
            }
        }
    }

    /// Handles one heartbeat tick.
    pub async fn on_heartbeat(&self, tick: HeartbeatTick) {
        if self.is_closed() {
            return;
        }
        let Some(item) = self.get(tick.handle) else {
            return;
        };

        match item.on_heartbeat_tick(tick.token) {
            EmitDecision::Emit(emission) => self.forward(&item, emission).await,
            EmitDecision::Suppress(reason) => {
                trace!(item_id = %item.item_id(), reason = ?reason, "Heartbeat suppressed");
            }
        }
    }

    async fn forward(&self, item: &MonitoredItem, emission: Emission) {
        let message = Message::new(
            item.endpoint(),
            item.item_id().clone(),
            emission.value,
            emission.source_timestamp,
            emission.reason,
        )
        .with_display_name(item.descriptor().display_name.clone());

        let heartbeat = message.is_heartbeat();
        match self.dispatcher.send(message).await {
            Ok(()) if heartbeat => self.diagnostics.increment_heartbeat(),
            Ok(()) => {}
            Err(e) => warn!(item_id = %item.item_id(), error = %e, "Message not accepted for dispatch"),
        }
    }

    /// Stops producing messages. Events arriving afterwards are ignored.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Spawns the task that feeds heartbeat ticks into the pipeline.
    ///
    /// The task ends when the tick channel closes, after finishing the
    /// message it is handing over.
    pub fn spawn_heartbeat_worker(
        self: &Arc<Self>,
        mut ticks: mpsc::Receiver<HeartbeatTick>,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(tick) = ticks.recv().await {
                pipeline.on_heartbeat(tick).await;
            }
            debug!("Heartbeat worker stopped");
        })
    }
}

impl std::fmt::Debug for NotificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPipeline")
            .field("items", &self.items.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::heartbeat::HeartbeatScheduler;
    use opcpub_core::types::{DataValue, EmitReason, ItemDescriptor};
    use opcpub_dispatch::{DispatchConfig, RecordingOutboundTransport};
    use std::time::Duration;

    struct Fixture {
        pipeline: Arc<NotificationPipeline>,
        scheduler: HeartbeatScheduler,
        transport: Arc<RecordingOutboundTransport>,
        dispatcher: Arc<DispatchAdapter>,
        diagnostics: Arc<Diagnostics>,
        worker: JoinHandle<()>,
    }

    async fn fixture() -> Fixture {
        let diagnostics = Arc::new(Diagnostics::new());
        let transport = Arc::new(RecordingOutboundTransport::new());
        let dispatcher = Arc::new(DispatchAdapter::new(
            Arc::clone(&transport) as _,
            DispatchConfig::for_testing(),
            Arc::clone(&diagnostics),
            "OpcPublisher",
        ));
        dispatcher.start().await;

        let (scheduler, ticks) = HeartbeatScheduler::new(64, Arc::clone(&diagnostics));
        scheduler.start();

        let pipeline = Arc::new(NotificationPipeline::new(
            Arc::clone(&diagnostics),
            Arc::clone(&dispatcher),
        ));
        let worker = pipeline.spawn_heartbeat_worker(ticks);

        Fixture {
            pipeline,
            scheduler,
            transport,
            dispatcher,
            diagnostics,
            worker,
        }
    }

    fn registered(f: &Fixture, handle: u32, descriptor: ItemDescriptor) -> Arc<MonitoredItem> {
        let item = Arc::new(MonitoredItem::new(
            ClientHandle(handle),
            Arc::from("opc.tcp://plc:50000"),
            descriptor,
        ));
        item.on_registered(&f.scheduler, false);
        f.pipeline.insert(Arc::clone(&item));
        item
    }

    fn notification(handle: u32, item: &str, value: i64) -> Notification {
        Notification::new(ClientHandle(handle), item, DataValue::Int64(value))
    }

    #[tokio::test]
    async fn test_data_change_is_forwarded() {
        let f = fixture().await;
        registered(&f, 1, ItemDescriptor::new("ns=2;s=A").with_display_name("A"));

        f.pipeline.dispatch(notification(1, "ns=2;s=A", 7)).await;
        f.transport.wait_for(1).await;

        let message = &f.transport.messages()[0];
        assert_eq!(message.item_id.as_str(), "ns=2;s=A");
        assert_eq!(message.display_name.as_deref(), Some("A"));
        assert_eq!(message.value, DataValue::Int64(7));
        assert_eq!(message.reason, EmitReason::DataChange);
        assert_eq!(message.product_info, "OpcPublisher");
        assert_eq!(f.diagnostics.snapshot().events_received, 1);
    }

    #[tokio::test]
    async fn test_skip_first_counts_received_not_sent() {
        let f = fixture().await;
        registered(&f, 1, ItemDescriptor::new("ns=2;s=A").with_skip_first(true));

        f.pipeline.dispatch(notification(1, "ns=2;s=A", 1)).await;
        f.pipeline.dispatch(notification(1, "ns=2;s=A", 2)).await;
        f.transport.wait_for(1).await;
        f.dispatcher.shutdown().await;

        let snapshot = f.diagnostics.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.messages_suppressed, 1);
        assert_eq!(snapshot.events_sent, 1);
        assert_eq!(f.transport.messages()[0].value, DataValue::Int64(2));
    }

    #[tokio::test]
    async fn test_unknown_handle_counted_as_received() {
        let f = fixture().await;
        f.pipeline.dispatch(notification(99, "ns=2;s=X", 1)).await;

        let snapshot = f.diagnostics.snapshot();
        assert_eq!(snapshot.events_received, 1);
        assert_eq!(snapshot.messages_suppressed, 1);
        assert_eq!(f.transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_closed_pipeline_drops_everything() {
        let f = fixture().await;
        registered(&f, 1, ItemDescriptor::new("ns=2;s=A"));

        f.pipeline.close();
        f.pipeline.dispatch(notification(1, "ns=2;s=A", 1)).await;

        assert_eq!(f.diagnostics.snapshot().events_received, 0);
        assert_eq!(f.transport.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_repeats_last_value() {
        let f = fixture().await;
        registered(
            &f,
            1,
            ItemDescriptor::new("ns=2;s=A").with_heartbeat_interval(Duration::from_secs(2)),
        );

        f.pipeline.dispatch(notification(1, "ns=2;s=A", 5)).await;
        tokio::time::sleep(Duration::from_millis(4500)).await;
        f.transport.wait_for(3).await;

        let messages = f.transport.messages();
        assert_eq!(messages.len(), 3);
        assert!(!messages[0].is_heartbeat());
        assert!(messages[1..].iter().all(|m| m.is_heartbeat()));
        assert!(messages.iter().all(|m| m.value == DataValue::Int64(5)));
        assert_eq!(f.diagnostics.snapshot().heartbeats_emitted, 2);

        f.scheduler.shutdown().await;
        drop(f.scheduler);
        f.worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_without_value_is_silent() {
        let f = fixture().await;
        registered(
            &f,
            1,
            ItemDescriptor::new("ns=2;s=A").with_heartbeat_interval(Duration::from_secs(1)),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(f.transport.attempts(), 0);
        assert_eq!(f.diagnostics.snapshot().heartbeats_emitted, 0);
    }
}
