// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared heartbeat scheduler.
//!
//! A single task drives the heartbeats of every monitored item. Pending fire
//! times sit in a min-heap; each entry carries the generation of the
//! registration that scheduled it, so cancelling is a map removal and stale
//! heap entries are discarded when they surface.
//!
//! ```text
//!  schedule(handle, H) ──▶ ┌──────────────────────────┐
//!  cancel(handle, gen) ──▶ │  BinaryHeap<(at, gen)>   │ ──▶ HeartbeatTick ──▶ pipeline
//!                          │  active: handle -> gen   │     (bounded, try_send)
//!                          └──────────────────────────┘
//! ```
//!
//! Periods are fixed: the next fire time is `previous + H`, never `now + H`,
//! so data-change emissions do not shift the cadence. Ticks are handed off
//! with `try_send`; when the consumer is saturated the tick is dropped and
//! counted rather than stalling every other item's timer.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use opcpub_core::diagnostics::Diagnostics;
use opcpub_core::types::ClientHandle;

// =============================================================================
// Public types
// =============================================================================

/// Identifies one heartbeat registration of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeartbeatToken(u64);

/// A due heartbeat, delivered to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTick {
    /// The item whose heartbeat is due.
    pub handle: ClientHandle,
    /// The registration that scheduled this tick.
    pub token: HeartbeatToken,
}

// =============================================================================
// Internal state
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
struct Entry {
    deadline: Instant,
    handle: ClientHandle,
    token: HeartbeatToken,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.token.cmp(&other.token))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct Active {
    token: HeartbeatToken,
    interval: Duration,
}

#[derive(Debug, Default)]
struct SchedulerState {
    heap: BinaryHeap<Reverse<Entry>>,
    active: HashMap<ClientHandle, Active>,
    next_token: u64,
    stopped: bool,
}

impl SchedulerState {
    fn is_live(&self, entry: &Entry) -> bool {
        self.active
            .get(&entry.handle)
            .is_some_and(|active| active.token == entry.token)
    }

    /// Drops cancelled entries from the top of the heap.
    ///
    /// Buried dead entries are swept once they outnumber the live ones, so
    /// repeated reconnects within one long interval cannot grow the heap.
    fn prune(&mut self) {
        if self.heap.len() > 2 * self.active.len().max(1) {
            let active = std::mem::take(&mut self.active);
            self.heap.retain(|Reverse(entry)| {
                active.get(&entry.handle).is_some_and(|a| a.token == entry.token)
            });
            self.active = active;
        }
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_live(top) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Pops every due entry, re-arms it, and returns the ticks to deliver.
    fn take_due(&mut self, now: Instant) -> Vec<HeartbeatTick> {
        let mut due = Vec::new();

        while let Some(Reverse(top)) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            let Some(active) = self.active.get(&entry.handle).copied() else {
                continue;
            };
            if active.token != entry.token {
                continue;
            }

            let mut next = entry.deadline + active.interval;
            if next <= now {
                // Fell more than a full period behind; resume the cadence from now.
                next = now + active.interval;
            }
            self.heap.push(Reverse(Entry {
                deadline: next,
                handle: entry.handle,
                token: entry.token,
            }));
            due.push(HeartbeatTick {
                handle: entry.handle,
                token: entry.token,
            });
        }

        due
    }
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    wakeup: Notify,
    ticks: Mutex<Option<mpsc::Sender<HeartbeatTick>>>,
    diagnostics: Arc<Diagnostics>,
    task: Mutex<Option<JoinHandle<()>>>,
}

// =============================================================================
// HeartbeatScheduler
// =============================================================================

/// One timer task for all item heartbeats.
///
/// Cheap to clone; all clones drive the same task.
#[derive(Clone)]
pub struct HeartbeatScheduler {
    inner: Arc<SchedulerInner>,
}

impl HeartbeatScheduler {
    /// Creates a scheduler and the receiver its ticks are delivered on.
    ///
    /// `tick_capacity` bounds the number of undelivered ticks.
    pub fn new(
        tick_capacity: usize,
        diagnostics: Arc<Diagnostics>,
    ) -> (Self, mpsc::Receiver<HeartbeatTick>) {
        let (tx, rx) = mpsc::channel(tick_capacity.max(1));
        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState::default()),
                wakeup: Notify::new(),
                ticks: Mutex::new(Some(tx)),
                diagnostics,
                task: Mutex::new(None),
            }),
        };
        (scheduler, rx)
    }

    /// Spawns the timer task. Calling it again is a no-op.
    pub fn start(&self) {
        let mut task = self.inner.task.lock();
        if task.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run(inner)));
    }

    /// Starts a periodic heartbeat for `handle`, replacing any previous one.
    ///
    /// The first tick fires one `interval` from now.
    pub fn schedule(&self, handle: ClientHandle, interval: Duration) -> HeartbeatToken {
        let mut state = self.inner.state.lock();
        state.next_token += 1;
        let token = HeartbeatToken(state.next_token);

        if !state.stopped && !interval.is_zero() {
            state.active.insert(handle, Active { token, interval });
            state.heap.push(Reverse(Entry {
                deadline: Instant::now() + interval,
                handle,
                token,
            }));
            drop(state);
            self.inner.wakeup.notify_one();
            trace!(handle = %handle, interval_ms = interval.as_millis() as u64, "Heartbeat scheduled");
        }

        token
    }

    /// Cancels the heartbeat registered under `token`.
    ///
    /// A no-op if `handle` has since been rescheduled under another token.
    pub fn cancel(&self, handle: ClientHandle, token: HeartbeatToken) {
        let mut state = self.inner.state.lock();
        if state.active.get(&handle).is_some_and(|a| a.token == token) {
            state.active.remove(&handle);
            trace!(handle = %handle, "Heartbeat cancelled");
        }
    }

    /// Returns `true` if `token` is the live heartbeat of `handle`.
    pub fn is_active(&self, handle: ClientHandle, token: HeartbeatToken) -> bool {
        self.inner
            .state
            .lock()
            .active
            .get(&handle)
            .is_some_and(|a| a.token == token)
    }

    /// Number of items with a live heartbeat.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    #[cfg(test)]
    fn queued_entries(&self) -> usize {
        self.inner.state.lock().heap.len()
    }

    /// Cancels every heartbeat and stops the timer task.
    ///
    /// The tick channel is closed afterwards, so its receiver ends once the
    /// ticks already delivered are consumed.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.stopped = true;
            state.active.clear();
            state.heap.clear();
        }
        self.inner.wakeup.notify_one();

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.ticks.lock().take();
        debug!("Heartbeat scheduler stopped");
    }
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("active", &self.active_count())
            .finish()
    }
}

async fn run(inner: Arc<SchedulerInner>) {
    loop {
        let next_deadline = {
            let mut state = inner.state.lock();
            if state.stopped {
                break;
            }
            state.prune();
            state.heap.peek().map(|Reverse(entry)| entry.deadline)
        };

        match next_deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = inner.wakeup.notified() => continue,
                }
            }
            None => {
                inner.wakeup.notified().await;
                continue;
            }
        }

        let due = inner.state.lock().take_due(Instant::now());
        let Some(ticks) = inner.ticks.lock().clone() else {
            return;
        };
        for tick in due {
            match ticks.try_send(tick) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(tick)) => {
                    inner.diagnostics.increment_heartbeat_skipped();
                    debug!(handle = %tick.handle, "Heartbeat tick skipped, delivery saturated");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
