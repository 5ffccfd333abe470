// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Outbound telemetry transports.
//!
//! [`OutboundTransport`] is the seam between the dispatch adapter and the
//! cloud ingestion endpoint. The adapter owns queuing, retries and counting;
//! a transport performs exactly one send per call.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use opcpub_core::error::{TransportError, TransportResult};
use opcpub_core::types::Message;

/// Header carrying the product identity on HTTP sends.
pub const PRODUCT_INFO_HEADER: &str = "x-product-info";

// =============================================================================
// Outbound Transport Trait
// =============================================================================

/// Acknowledgement of an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack {
    /// Payload size in bytes.
    pub bytes: u64,
}

/// Sends shaped messages to the telemetry endpoint.
#[async_trait]
pub trait OutboundTransport: Send + Sync + 'static {
    /// Sends one message.
    ///
    /// # Returns
    ///
    /// - `Ok(Ack)` once the endpoint accepted the message
    /// - `Err(TransportError)` if the send failed
    async fn send(&self, message: &Message) -> TransportResult<Ack>;

    /// Sets the product/client identity used to tag outbound messages.
    fn set_product_info(&self, product_info: &str);

    /// Returns the name of this transport for logging/metrics.
    fn name(&self) -> &str;

    /// Returns true if the transport is currently healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

// =============================================================================
// HTTP Outbound Transport
// =============================================================================

/// Posts each message as JSON to an HTTP endpoint.
#[derive(Debug)]
pub struct HttpOutboundTransport {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    product_info: RwLock<String>,
    healthy: AtomicBool,
}

impl HttpOutboundTransport {
    /// Creates a new HTTP transport.
    pub fn new(url: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TransportError::unreachable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
            product_info: RwLock::new(String::new()),
            healthy: AtomicBool::new(true),
        })
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OutboundTransport for HttpOutboundTransport {
    async fn send(&self, message: &Message) -> TransportResult<Ack> {
        let body = serde_json::to_vec(message).map_err(|e| TransportError::encode(e.to_string()))?;
        let bytes = body.len() as u64;
        let product_info = self.product_info.read().clone();

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(PRODUCT_INFO_HEADER, product_info)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                self.healthy.store(false, Ordering::Relaxed);
                if e.is_timeout() {
                    TransportError::timeout(self.timeout)
                } else {
                    TransportError::unreachable(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            self.healthy.store(true, Ordering::Relaxed);
            Ok(Ack { bytes })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::rejected(status.as_u16(), body))
        }
    }

    fn set_product_info(&self, product_info: &str) {
        *self.product_info.write() = product_info.to_string();
    }

    fn name(&self) -> &str {
        "http"
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Recording Outbound Transport (for testing)
// =============================================================================

/// An in-memory transport that records every accepted message.
///
/// Failures can be scripted with [`fail_next`](Self::fail_next) or
/// [`set_should_fail`](Self::set_should_fail), and slow endpoints simulated
/// with [`set_delay`](Self::set_delay).
#[derive(Debug, Default)]
pub struct RecordingOutboundTransport {
    messages: Mutex<Vec<Message>>,
    product_info: RwLock<String>,
    attempts: AtomicU64,
    fail_next: AtomicU32,
    should_fail: AtomicBool,
    delay_ms: AtomicU64,
    sent: Notify,
}

impl RecordingOutboundTransport {
    /// Creates a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that rejects everything.
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_should_fail(true);
        transport
    }

    /// Fails the next `count` sends with a retryable error.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Sets whether every send fails.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Delays every send by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Returns a copy of the accepted messages, in acceptance order.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Returns the number of accepted messages.
    pub fn sent_count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns the number of send calls, including failed ones.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns the product identity the transport was told.
    pub fn product_info(&self) -> String {
        self.product_info.read().clone()
    }

    /// Waits until at least `count` messages were accepted.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.sent.notified();
            if self.sent_count() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Clears the recorded messages.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl OutboundTransport for RecordingOutboundTransport {
    async fn send(&self, message: &Message) -> TransportResult<Ack> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(TransportError::unreachable("recording transport set to fail"));
        }
        let scripted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if scripted.is_ok() {
            return Err(TransportError::rejected(503, "scripted failure"));
        }

        let bytes = message.item_id.as_str().len() as u64;
        self.messages.lock().push(message.clone());
        self.sent.notify_waiters();
        Ok(Ack { bytes })
    }

    fn set_product_info(&self, product_info: &str) {
        *self.product_info.write() = product_info.to_string();
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// =============================================================================
// Tests
// =============================================================================
