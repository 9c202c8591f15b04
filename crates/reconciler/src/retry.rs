//! Retry logic with exponential backoff for transient adapter errors,
//! plus the per-action timeout wrapper.

use crate::cancel::CancelHandle;
use crate::error::{AdapterError, ErrorCategory};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Retry ceiling and backoff shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given retry number (0-indexed).
    ///
    /// A factor below 1 (or NaN) is treated as 1, so delays never shrink.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            1.0
        } else {
            self.backoff_factor
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * factor.powi(exponent);
        if delay.is_finite() && delay < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(delay)
        } else {
            self.max_delay
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Why a retried operation stopped without succeeding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GaveUp {
    /// Non-retryable error; returned on the attempt it occurred
    Permanent(AdapterError),
    /// Transient errors until the attempt ceiling
    Exhausted(AdapterError),
    /// Cancelled while waiting to retry; carries the last error seen
    Cancelled(AdapterError),
}

impl GaveUp {
    pub fn error(&self) -> &AdapterError {
        match self {
            Self::Permanent(e) | Self::Exhausted(e) | Self::Cancelled(e) => e,
        }
    }

    pub fn into_error(self) -> AdapterError {
        match self {
            Self::Permanent(e) | Self::Exhausted(e) | Self::Cancelled(e) => e,
        }
    }
}

/// Result of [`with_retry`] together with the number of attempts made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, GaveUp>,
    pub attempts: u32,
}

/// Execute an operation with retry logic.
///
/// Retries while the operation returns a retryable error, sleeping with
/// exponential backoff between attempts. Sleeps wake early on cancellation.
///
/// # Arguments
/// * `policy` - Retry ceiling and backoff
/// * `cancel` - Signal that aborts pending retries
/// * `on_retry` - Called with (failed attempt, error, delay) before each sleep
/// * `operation` - The operation to execute; receives the 1-indexed attempt
pub fn with_retry<T, F, R>(
    policy: &RetryPolicy,
    cancel: &CancelHandle,
    mut on_retry: R,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Result<T, AdapterError>,
    R: FnMut(u32, &AdapterError, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation(attempt) {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            return RetryOutcome {
                result: Err(GaveUp::Permanent(err)),
                attempts: attempt,
            };
        }

        if attempt >= max_attempts {
            return RetryOutcome {
                result: Err(GaveUp::Exhausted(err)),
                attempts: attempt,
            };
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        on_retry(attempt, &err, delay);

        if cancel.wait_timeout(delay) {
            return RetryOutcome {
                result: Err(GaveUp::Cancelled(err)),
                attempts: attempt,
            };
        }
    }
}

/// Run a blocking adapter call, giving up on it after `limit`.
///
/// With a limit the call runs on its own thread. If the limit passes first
/// the call is left to finish in the background and a transient
/// [`ErrorCategory::Timeout`] error is returned.
pub fn call_with_timeout<T, F>(limit: Option<Duration>, label: &str, call: F) -> Result<T, AdapterError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AdapterError> + Send + 'static,
{
    let Some(limit) = limit else {
        return call();
    };

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("adapter:{label}"))
        .spawn(move || {
            // Receiver is gone once the caller timed out.
            let _ = tx.send(call());
        })
        .map_err(|e| {
            AdapterError::transient(
                ErrorCategory::Unavailable,
                format!("failed to start adapter call: {e}"),
            )
        })?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("{label}: adapter call exceeded {}ms", limit.as_millis());
            Err(AdapterError::timed_out(limit))
        }
        Err(RecvTimeoutError::Disconnected) => Err(AdapterError::permanent(
            ErrorCategory::Other,
            "adapter call panicked",
        )),
    }
}
