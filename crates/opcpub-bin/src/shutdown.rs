// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shutdown signalling for the publisher runtime.
//!
//! One [`ShutdownCoordinator`] per runtime. It is tripped by SIGTERM, SIGINT
//! (Ctrl+C elsewhere) or an explicit [`ShutdownCoordinator::trigger`].
//! Background tasks hold a [`ShutdownListener`]. A listener created after the
//! trip still sees it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Trips once and stays tripped.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tripped: Arc<watch::Sender<bool>>,
}

impl ShutdownCoordinator {
    /// Creates an untripped coordinator.
    pub fn new() -> Self {
        let (tripped, _) = watch::channel(false);
        Self {
            tripped: Arc::new(tripped),
        }
    }

    /// Returns a listener for background tasks.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tripped.subscribe(),
        }
    }

    /// Trips the coordinator. Later calls only log at debug level.
    pub fn trigger(&self, reason: &str) {
        let first = self.tripped.send_if_modified(|tripped| !std::mem::replace(tripped, true));
        if first {
            info!(reason = reason, "Shutdown requested");
        } else {
            tracing::debug!(reason = reason, "Shutdown already requested");
        }
    }

    /// Returns true once tripped.
    pub fn is_triggered(&self) -> bool {
        *self.tripped.borrow()
    }

    /// Resolves when the coordinator trips or the process receives a
    /// termination signal, whichever comes first.
    pub async fn wait(&self) {
        let mut listener = self.subscribe();
        tokio::select! {
            _ = listener.triggered() => {}
            reason = os_signal() => self.trigger(reason),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

/// Receiving side of a [`ShutdownCoordinator`].
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once the coordinator has tripped.
    ///
    /// Also resolves if the coordinator was dropped, since nothing can trip
    /// it any more.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|tripped| *tripped).await;
    }
}

#[cfg(unix)]
async fn os_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut term), Ok(mut int)) => tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        },
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Signal handlers unavailable, listening for Ctrl+C only");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C listener failed");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
