// SPDX-License-Identifier: MIT
//! Bounded exponential backoff for transient failures.
//!
//! The core's writes are safe to retry — message appends carry a client
//! idempotency key and status transitions are guarded by preconditions — so
//! callers wrap transient `StoreUnavailable` / upload failures in
//! [`retry_with_backoff`] instead of hand-rolling loops.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first try.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled (by `multiplier`) after each
    /// failure, capped at `max_delay`.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Config for unit tests — no real waiting.
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Returns the first `Ok`, or the last error once `max_attempts` is
/// exhausted.
///
/// # Panics
/// Panics if `config.max_attempts` is 0.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    assert!(config.max_attempts > 0, "max_attempts must be at least 1");

    let mut delay = config.initial_delay;
    let mut last_err: Option<E> = None;

    for attempt in 1..=config.max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt < config.max_attempts {
                    warn!(
                        attempt,
                        max = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = ?e,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    let next = delay.as_secs_f64() * config.multiplier;
                    delay = Duration::from_secs_f64(next).min(config.max_delay);
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("at least one attempt was made"))
}

/// Like [`retry_with_backoff`], but gives up immediately on errors that are
/// not transient ([`CoreError::is_retryable`]). Validation errors never burn
/// retry budget.
pub async fn retry_transient<F, Fut, T>(
    config: &RetryConfig,
    mut f: F,
) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<T>>,
{
    assert!(config.max_attempts > 0, "max_attempts must be at least 1");

    let mut delay = config.initial_delay;
    let mut last_err: Option<CoreError> = None;

    for attempt in 1..=config.max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt < config.max_attempts {
                    warn!(
                        attempt,
                        max = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = %e,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    let next = delay.as_secs_f64() * config.multiplier;
                    delay = Duration::from_secs_f64(next).min(config.max_delay);
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("at least one attempt was made"))
}
