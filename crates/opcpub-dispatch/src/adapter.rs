// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Outbound dispatch adapter with bounded queues and retry.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         DispatchAdapter                           │
//! │                                                                   │
//! │  send(msg) ──hash(item_id)──▶ shard 0 [bounded] ──▶ worker 0 ──┐  │
//! │                          └──▶ shard 1 [bounded] ──▶ worker 1 ──┤  │
//! │                          └──▶ shard N [bounded] ──▶ worker N ──┤  │
//! │                                                                ▼  │
//! │                            ExponentialBackoff ◀── OutboundTransport│
//! │                                                                   │
//! │  Diagnostics: messages_enqueued / events_sent / send_failures     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Backpressure**: each shard is a bounded channel; `send` waits for
//!   room instead of growing memory without bound.
//! - **Ordering**: all messages of one item land on the same shard and are
//!   sent one at a time, so per-item order survives retries.
//! - **Counting**: `events_sent` after the transport acknowledges,
//!   `send_failures` once per message that exhausted its attempts or was
//!   abandoned at shutdown. No message leaves the adapter uncounted.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use opcpub_core::diagnostics::Diagnostics;
use opcpub_core::error::{DispatchError, TransportError};
use opcpub_core::retry::{ExponentialBackoff, RetryConfig, RetryDecision, RetryStrategy};
use opcpub_core::types::{duration_millis, Message};

use crate::metrics::DispatchMetricsCollector;
use crate::outbound::OutboundTransport;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the dispatch adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Total queued messages across all workers before `send` blocks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of concurrent send workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Attempts per message, including the first.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_retry_base_delay")]
    #[serde(with = "duration_millis")]
    pub retry_base_delay: Duration,

    /// Maximum delay between retries.
    #[serde(default = "default_max_retry_delay")]
    #[serde(with = "duration_millis")]
    pub max_retry_delay: Duration,

    /// Jitter factor for retries (0.0 to 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Upper bound for one transport send.
    #[serde(default = "default_send_timeout")]
    #[serde(with = "duration_millis")]
    pub send_timeout: Duration,

    /// How long shutdown waits for queued messages to drain.
    #[serde(default = "default_shutdown_timeout")]
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,

    /// Whether to record Prometheus metrics.
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    4
}

fn default_max_send_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_jitter() -> f64 {
    0.1
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_enable_metrics() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            max_send_attempts: default_max_send_attempts(),
            retry_base_delay: default_retry_base_delay(),
            max_retry_delay: default_max_retry_delay(),
            jitter: default_jitter(),
            send_timeout: default_send_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            enable_metrics: default_enable_metrics(),
        }
    }
}

impl DispatchConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }

    /// Creates a configuration for testing.
    pub fn for_testing() -> Self {
        Self {
            queue_capacity: 64,
            workers: 2,
            max_send_attempts: 3,
            retry_base_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(100),
            jitter: 0.0,
            send_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            enable_metrics: false,
        }
    }

    /// Capacity of each worker's queue.
    pub fn shard_capacity(&self) -> usize {
        (self.queue_capacity / self.workers.max(1)).max(1)
    }

    /// Retry policy derived from this configuration.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_attempts(self.max_send_attempts.max(1))
            .with_initial_delay(self.retry_base_delay)
            .with_max_delay(self.max_retry_delay)
            .with_jitter(self.jitter)
    }
}

/// Builder for [`DispatchConfig`].
#[derive(Debug, Default)]
pub struct DispatchConfigBuilder {
    config: DispatchConfig,
}

impl DispatchConfigBuilder {
    /// Sets the total queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Sets the worker count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Sets the maximum send attempts.
    pub fn max_send_attempts(mut self, attempts: u32) -> Self {
        self.config.max_send_attempts = attempts;
        self
    }

    /// Sets the retry base delay.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    /// Sets the maximum retry delay.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    /// Sets the jitter factor.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Sets the per-send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = timeout;
        self
    }

    /// Sets the shutdown drain timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Enables or disables metrics.
    pub fn enable_metrics(mut self, enabled: bool) -> Self {
        self.config.enable_metrics = enabled;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DispatchConfig {
        self.config
    }
}

// =============================================================================
// Dispatch Adapter
// =============================================================================

struct WorkerContext {
    transport: Arc<dyn OutboundTransport>,
    diagnostics: Arc<Diagnostics>,
    metrics: DispatchMetricsCollector,
    strategy: ExponentialBackoff,
    send_timeout: Duration,
    pending: Arc<AtomicU64>,
}

/// Queues shaped messages and delivers them through an [`OutboundTransport`].
pub struct DispatchAdapter {
    config: DispatchConfig,
    transport: Arc<dyn OutboundTransport>,
    diagnostics: Arc<Diagnostics>,
    metrics: DispatchMetricsCollector,
    product_info: String,
    senders: RwLock<Option<Vec<mpsc::Sender<Message>>>>,
    receivers: Mutex<Vec<mpsc::Receiver<Message>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicU64>,
    running: AtomicBool,
    abandoned: AtomicBool,
}

impl DispatchAdapter {
    /// Creates a new adapter and tells `transport` the product identity.
    ///
    /// Workers are not running until [`start`](Self::start) is called.
    pub fn new(
        transport: Arc<dyn OutboundTransport>,
        config: DispatchConfig,
        diagnostics: Arc<Diagnostics>,
        product_info: impl Into<String>,
    ) -> Self {
        let product_info = product_info.into();
        transport.set_product_info(&product_info);

        let shard_capacity = config.shard_capacity();
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..config.workers.max(1))
            .map(|_| mpsc::channel(shard_capacity))
            .unzip();

        Self {
            metrics: DispatchMetricsCollector::new(config.enable_metrics),
            config,
            transport,
            diagnostics,
            product_info,
            senders: RwLock::new(Some(senders)),
            receivers: Mutex::new(receivers),
            workers: tokio::sync::Mutex::new(Vec::new()),
            pending: Arc::new(AtomicU64::new(0)),
            running: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
        }
    }

    /// Spawns the send workers. Calling it again is a no-op.
    pub async fn start(&self) {
        let receivers: Vec<_> = std::mem::take(&mut *self.receivers.lock());
        if receivers.is_empty() {
            return;
        }

        let mut workers = self.workers.lock().await;
        for (index, rx) in receivers.into_iter().enumerate() {
            let ctx = WorkerContext {
                transport: Arc::clone(&self.transport),
                diagnostics: Arc::clone(&self.diagnostics),
                metrics: self.metrics,
                strategy: ExponentialBackoff::new(self.config.retry_config()),
                send_timeout: self.config.send_timeout,
                pending: Arc::clone(&self.pending),
            };
            workers.push(tokio::spawn(run_worker(index, rx, ctx)));
        }
        self.running.store(true, Ordering::SeqCst);

        info!(
            transport = self.transport.name(),
            workers = workers.len(),
            queue_capacity = self.config.queue_capacity,
            max_send_attempts = self.config.max_send_attempts,
            "Dispatch adapter started"
        );
    }

    /// Enqueues a message for delivery.
    ///
    /// Waits while the item's queue is full. Fails only once the adapter is
    /// closed or was never started. Dropping the future while it waits
    /// leaves no trace in the counters.
    pub async fn send(&self, mut message: Message) -> Result<(), DispatchError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(if self.senders.read().is_none() {
                DispatchError::Closed
            } else {
                DispatchError::NotRunning
            });
        }

        let sender = {
            let senders = self.senders.read();
            let Some(senders) = senders.as_ref() else {
                return Err(DispatchError::Closed);
            };
            senders[shard_for(&message, senders.len())].clone()
        };

        if message.product_info.is_empty() {
            message.product_info.clone_from(&self.product_info);
        }

        let permit = sender.reserve().await.map_err(|_| DispatchError::Closed)?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.diagnostics.increment_enqueued();
        permit.send(message);

        // a slot reserved just before the workers were abandoned
        if self.abandoned.load(Ordering::SeqCst) {
            self.count_abandoned();
        }
        self.metrics.set_queue_depth(self.pending.load(Ordering::Relaxed));
        Ok(())
    }

    /// Stops accepting messages and drains the queues.
    ///
    /// Workers get `shutdown_timeout` to finish; whatever is still queued
    /// after that is counted as send failures. Idempotent.
    pub async fn shutdown(&self) {
        let closed = self.senders.write().take();
        if closed.is_none() {
            return;
        }
        drop(closed);

        let mut workers = self.workers.lock().await;
        let mut handles: Vec<_> = workers.drain(..).collect();
        let drain = futures::future::join_all(handles.iter_mut());
        let drained = tokio::time::timeout(self.config.shutdown_timeout, drain)
            .await
            .is_ok();

        if drained {
            info!("Dispatch adapter drained");
        } else {
            for handle in &handles {
                handle.abort();
            }
            // receivers are gone once the aborted workers are joined
            futures::future::join_all(handles.iter_mut()).await;
            self.abandoned.store(true, Ordering::SeqCst);
            let abandoned = self.count_abandoned();
            warn!(
                abandoned = abandoned,
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "Dispatch drain timed out, abandoning queued messages"
            );
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Counts everything still pending as failed.
    fn count_abandoned(&self) -> u64 {
        let abandoned = self.pending.swap(0, Ordering::SeqCst);
        if abandoned > 0 {
            self.diagnostics.add_send_failures(abandoned);
            self.metrics.record_dropped(abandoned);
        }
        abandoned
    }

    /// Messages queued or in flight.
    pub fn queue_depth(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Returns true while workers are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns true once shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.senders.read().is_none()
    }

    /// Product identity stamped on every message.
    pub fn product_info(&self) -> &str {
        &self.product_info
    }

    /// Configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The outbound transport.
    pub fn transport(&self) -> &Arc<dyn OutboundTransport> {
        &self.transport
    }
}

impl std::fmt::Debug for DispatchAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchAdapter")
            .field("transport", &self.transport.name())
            .field("queue_depth", &self.queue_depth())
            .field("running", &self.is_running())
            .finish()
    }
}

fn shard_for(message: &Message, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    message.endpoint.hash(&mut hasher);
    message.item_id.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

// =============================================================================
// Workers
// =============================================================================

async fn run_worker(index: usize, mut rx: mpsc::Receiver<Message>, ctx: WorkerContext) {
    debug!(worker = index, "Dispatch worker started");

    while let Some(message) = rx.recv().await {
        deliver(&ctx, message).await;
        let _ = ctx
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    debug!(worker = index, "Dispatch worker stopped");
}

async fn deliver(ctx: &WorkerContext, message: Message) {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let started = std::time::Instant::now();

        let result = match tokio::time::timeout(ctx.send_timeout, ctx.transport.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(ctx.send_timeout)),
        };

        match result {
            Ok(ack) => {
                ctx.diagnostics.increment_sent(ack.bytes);
                ctx.metrics.record_send(started.elapsed().as_secs_f64());
                return;
            }
            Err(error) => {
                ctx.metrics.record_send_error(error.error_type());

                match ctx.strategy.should_retry(&error, attempt) {
                    RetryDecision::Retry(delay) => {
                        ctx.metrics.record_retry();
                        debug!(
                            item_id = %message.item_id,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying send after delay"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry => {
                        ctx.diagnostics.increment_send_failure();
                        ctx.metrics.record_dropped(1);
                        warn!(
                            item_id = %message.item_id,
                            endpoint = %message.endpoint,
                            attempts = attempt,
                            error = %error,
                            "Dropping message after failed send"
                        );
                        return;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::RecordingOutboundTransport;
    use chrono::Utc;
    use opcpub_core::types::{DataValue, EmitReason, ItemId};

    fn message(item: &str, value: i64) -> Message {
        Message::new(
            "opc.tcp://plc:50000",
            ItemId::new(item),
            DataValue::Int64(value),
            Utc::now(),
            EmitReason::DataChange,
        )
    }

    async fn adapter(
        transport: Arc<RecordingOutboundTransport>,
        config: DispatchConfig,
    ) -> (DispatchAdapter, Arc<Diagnostics>) {
        let diagnostics = Arc::new(Diagnostics::new());
        let adapter = DispatchAdapter::new(transport, config, Arc::clone(&diagnostics), "OpcPublisher");
        adapter.start().await;
        (adapter, diagnostics)
    }

    #[test]
    fn test_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.workers, 4);
        assert_eq!(config.shard_capacity(), 256);

        let config: DispatchConfig = serde_json::from_str(r#"{"workers": 0}"#).unwrap();
        assert_eq!(config.shard_capacity(), 1024);
    }

    #[test]
    fn test_config_builder() {
        let config = DispatchConfig::builder()
            .queue_capacity(10)
            .workers(3)
            .max_send_attempts(5)
            .jitter(2.0)
            .build();
        assert_eq!(config.shard_capacity(), 3);
        assert_eq!(config.jitter, 1.0);
        assert_eq!(config.retry_config().max_attempts, 5);
    }

    #[tokio::test]
    async fn test_send_before_start_fails() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        let adapter = DispatchAdapter::new(
            transport,
            DispatchConfig::for_testing(),
            Arc::new(Diagnostics::new()),
            "OpcPublisher",
        );
        assert_eq!(adapter.send(message("a", 1)).await, Err(DispatchError::NotRunning));
    }

    #[tokio::test]
    async fn test_send_and_ack() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        let (adapter, diagnostics) = adapter(Arc::clone(&transport), DispatchConfig::for_testing()).await;

        for i in 0..10 {
            adapter.send(message("ns=2;s=A", i)).await.unwrap();
        }
        adapter.shutdown().await;

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.messages_enqueued, 10);
        assert_eq!(snapshot.events_sent, 10);
        assert_eq!(snapshot.send_failures, 0);
        assert_eq!(transport.product_info(), "OpcPublisher");
        assert!(transport
            .messages()
            .iter()
            .all(|m| m.product_info == "OpcPublisher"));
    }

    #[tokio::test]
    async fn test_per_item_order_preserved() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        let config = DispatchConfig::builder().workers(4).queue_capacity(64).jitter(0.0).build();
        let (adapter, _) = adapter(Arc::clone(&transport), config).await;

        for i in 0..50 {
            adapter.send(message("ns=2;s=A", i)).await.unwrap();
            adapter.send(message("ns=2;s=B", i)).await.unwrap();
        }
        adapter.shutdown().await;

        for item in ["ns=2;s=A", "ns=2;s=B"] {
            let values: Vec<_> = transport
                .messages()
                .into_iter()
                .filter(|m| m.item_id.as_str() == item)
                .map(|m| m.value)
                .collect();
            let expected: Vec<_> = (0..50).map(DataValue::Int64).collect();
            assert_eq!(values, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        transport.fail_next(2);
        let (adapter, diagnostics) = adapter(Arc::clone(&transport), DispatchConfig::for_testing()).await;

        adapter.send(message("a", 1)).await.unwrap();
        adapter.shutdown().await;

        let snapshot = diagnostics.snapshot();
        assert_eq!(transport.attempts(), 3);
        assert_eq!(snapshot.events_sent, 1);
        assert_eq!(snapshot.send_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_counted_once() {
        let transport = Arc::new(RecordingOutboundTransport::failing());
        let (adapter, diagnostics) = adapter(Arc::clone(&transport), DispatchConfig::for_testing()).await;

        adapter.send(message("a", 1)).await.unwrap();
        adapter.send(message("b", 2)).await.unwrap();
        adapter.shutdown().await;

        let snapshot = diagnostics.snapshot();
        assert_eq!(transport.attempts(), 6);
        assert_eq!(snapshot.events_sent, 0);
        assert_eq!(snapshot.send_failures, 2);
        assert_eq!(snapshot.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backpressure_blocks_sender() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        transport.set_delay(Duration::from_secs(1));
        let config = DispatchConfig::builder()
            .workers(1)
            .queue_capacity(2)
            .enable_metrics(false)
            .build();
        let (adapter, _) = adapter(Arc::clone(&transport), config).await;
        let adapter = Arc::new(adapter);

        // One message in flight plus two queued fills the shard.
        for i in 0..3 {
            adapter.send(message("a", i)).await.unwrap();
        }

        let blocked = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.send(message("a", 3)).await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!blocked.is_finished());

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(blocked.is_finished());
        assert!(blocked.await.unwrap().is_ok());

        adapter.shutdown().await;
        assert_eq!(transport.sent_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timeout_counts_abandoned() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        transport.set_delay(Duration::from_secs(10));
        let config = DispatchConfig::builder()
            .workers(1)
            .queue_capacity(8)
            .send_timeout(Duration::from_secs(60))
            .shutdown_timeout(Duration::from_secs(1))
            .enable_metrics(false)
            .build();
        let (adapter, diagnostics) = adapter(Arc::clone(&transport), config).await;

        for i in 0..3 {
            adapter.send(message("a", i)).await.unwrap();
        }
        adapter.shutdown().await;

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.events_sent, 0);
        assert_eq!(snapshot.send_failures, 3);
        assert_eq!(adapter.queue_depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_send_leaves_no_trace() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        transport.set_delay(Duration::from_secs(10));
        let config = DispatchConfig::builder()
            .workers(1)
            .queue_capacity(1)
            .send_timeout(Duration::from_secs(60))
            .shutdown_timeout(Duration::from_secs(1))
            .enable_metrics(false)
            .build();
        let (adapter, diagnostics) = adapter(Arc::clone(&transport), config).await;
        let adapter = Arc::new(adapter);

        // one in flight, one queued
        for i in 0..2 {
            adapter.send(message("a", i)).await.unwrap();
        }

        let blocked = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.send(message("a", 2)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!blocked.is_finished());
        blocked.abort();
        assert!(blocked.await.unwrap_err().is_cancelled());
        assert_eq!(adapter.queue_depth(), 2);

        adapter.shutdown().await;

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.messages_enqueued, 2);
        assert_eq!(snapshot.events_sent, 0);
        assert_eq!(snapshot.send_failures, 2);
        assert_eq!(adapter.queue_depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sender_blocked_at_shutdown_is_closed() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        transport.set_delay(Duration::from_secs(10));
        let config = DispatchConfig::builder()
            .workers(1)
            .queue_capacity(1)
            .send_timeout(Duration::from_secs(60))
            .shutdown_timeout(Duration::from_secs(1))
            .enable_metrics(false)
            .build();
        let (adapter, diagnostics) = adapter(Arc::clone(&transport), config).await;
        let adapter = Arc::new(adapter);

        for i in 0..2 {
            adapter.send(message("a", i)).await.unwrap();
        }
        let blocked = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.send(message("a", 2)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        adapter.shutdown().await;
        assert_eq!(blocked.await.unwrap(), Err(DispatchError::Closed));

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.messages_enqueued, 2);
        assert_eq!(snapshot.events_sent + snapshot.send_failures, snapshot.messages_enqueued);
        assert_eq!(adapter.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_is_closed() {
        let transport = Arc::new(RecordingOutboundTransport::new());
        let (adapter, _) = adapter(transport, DispatchConfig::for_testing()).await;

        adapter.shutdown().await;
        adapter.shutdown().await;

        assert!(adapter.is_closed());
        assert_eq!(adapter.send(message("a", 1)).await, Err(DispatchError::Closed));
    }
}
