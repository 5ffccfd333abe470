// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscriptions: monitored items sharing one publishing cadence.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::item::MonitoredItem;
use super::transport::SubscriptionHandle;

/// A group of items created together on one session.
///
/// The item list is fixed at configuration load; only the transport handle
/// changes across reconnects.
#[derive(Debug)]
pub struct Subscription {
    publishing_interval: Duration,
    items: Vec<Arc<MonitoredItem>>,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl Subscription {
    /// Creates a subscription owning `items`.
    pub fn new(publishing_interval: Duration, items: Vec<Arc<MonitoredItem>>) -> Self {
        Self {
            publishing_interval,
            items,
            handle: Mutex::new(None),
        }
    }

    /// Publishing interval.
    #[inline]
    pub fn publishing_interval(&self) -> Duration {
        self.publishing_interval
    }

    /// Items in configuration order.
    #[inline]
    pub fn items(&self) -> &[Arc<MonitoredItem>] {
        &self.items
    }

    /// Transport handle, if created on the current session.
    pub fn handle(&self) -> Option<SubscriptionHandle> {
        *self.handle.lock()
    }

    /// Returns `true` if created on the current session.
    pub fn is_connected(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub(crate) fn set_handle(&self, handle: SubscriptionHandle) {
        *self.handle.lock() = Some(handle);
    }

    pub(crate) fn clear_handle(&self) {
        *self.handle.lock() = None;
    }

    /// Number of items currently registered.
    pub fn monitored_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_registered()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcpub_core::types::{ClientHandle, ItemDescriptor};

    #[test]
    fn test_subscription_handle_lifecycle() {
        let endpoint: Arc<str> = Arc::from("opc.tcp://plc:50000");
        let items = vec![Arc::new(MonitoredItem::new(
            ClientHandle(1),
            endpoint,
            ItemDescriptor::new("ns=2;s=A"),
        ))];
        let subscription = Subscription::new(Duration::from_secs(1), items);

        assert!(!subscription.is_connected());
        subscription.set_handle(SubscriptionHandle(3));
        assert_eq!(subscription.handle(), Some(SubscriptionHandle(3)));
        subscription.clear_handle();
        assert!(!subscription.is_connected());
        assert_eq!(subscription.items().len(), 1);
        assert_eq!(subscription.monitored_count(), 0);
    }
}
