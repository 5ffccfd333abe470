// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Retry policies shared by session reconnects and outbound sends.
//!
//! [`ExponentialBackoff`] waits `initial * multiplier^(attempt-1)`, capped at
//! `max_delay`. Session reconnects use [`RetryConfig::reconnect`], which never
//! gives up. Outbound sends use a bounded attempt count.
//!
//! Strategies only decide; the caller owns the sleeping so it can race the
//! delay against its own shutdown signal.
//!
//! # Example
//!
//! ```
//! use opcpub_core::retry::{ExponentialBackoff, RetryConfig, RetryDecision, RetryStrategy};
//! use opcpub_core::error::ConnectionError;
//! use std::time::Duration;
//!
//! let strategy = ExponentialBackoff::new(
//!     RetryConfig::default()
//!         .with_initial_delay(Duration::from_millis(100))
//!         .with_max_attempts(3),
//! );
//!
//! let error = ConnectionError::failed("opc.tcp://plc:50000", "refused");
//! assert_eq!(strategy.should_retry(&error, 1), RetryDecision::Retry(Duration::from_millis(100)));
//! assert_eq!(strategy.should_retry(&error, 2), RetryDecision::Retry(Duration::from_millis(200)));
//! assert_eq!(strategy.should_retry(&error, 3), RetryDecision::DoNotRetry);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, PublisherError, RegistrationError, TransportError};
use crate::types::duration_millis;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    /// Returns `true` if repeating the operation may succeed.
    fn is_retryable(&self) -> bool;
}

macro_rules! retryable {
    ($($ty:ty),+) => {
        $(impl Retryable for $ty {
            fn is_retryable(&self) -> bool {
                <$ty>::is_retryable(self)
            }
        })+
    };
}

retryable!(PublisherError, ConnectionError, RegistrationError, TransportError);

// =============================================================================
// Retry Configuration
// =============================================================================

/// Configuration for retry strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts including the first; `0` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_delay")]
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    #[serde(default = "default_max_delay")]
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays.
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Reconnect policy for device sessions: unbounded attempts, capped delay.
    pub fn reconnect() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Returns `true` if `attempt` (1-based) is the last one allowed.
    #[inline]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

// =============================================================================
// Retry Decision
// =============================================================================

/// Decision on whether to retry an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    Retry(Duration),
    /// Do not retry, return the error.
    DoNotRetry,
}

// =============================================================================
// Retry Strategy Trait
// =============================================================================

/// Decides whether a failed reconnect or send is tried again.
pub trait RetryStrategy: Send + Sync {
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn should_retry(&self, error: &dyn Retryable, attempt: u32) -> RetryDecision;
}

// =============================================================================
// Exponential Backoff Strategy
// =============================================================================

/// A strategy with exponentially increasing delays.
///
/// Delay formula: `min(initial_delay * multiplier^(attempt-1), max_delay)`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    /// Creates a new exponential backoff strategy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calculates the un-jittered delay for a given attempt.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64;
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplied = base_delay * self.config.multiplier.powi(exponent);
        let capped = multiplied.min(self.config.max_delay.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn should_retry(&self, error: &dyn Retryable, attempt: u32) -> RetryDecision {
        if self.config.is_exhausted(attempt) || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }

        let base_delay = self.calculate_delay(attempt);
        RetryDecision::Retry(apply_jitter(base_delay, self.config.jitter))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Randomizes `duration` by up to `±jitter_factor`.
pub fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let millis = duration.as_millis() as f64;
    let jitter_range = millis * jitter_factor.min(1.0);
    let random = rand::random::<f64>() * 2.0 - 1.0;
    let jittered = millis + random * jitter_range;

    Duration::from_millis(jittered.max(0.0) as u64)
}

// =============================================================================
// Tests
// =============================================================================
