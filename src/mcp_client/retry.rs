//! Retry policy shared by connection establishment and tool execution.
//!
//! A policy is a plain value: `max_attempts` total tries with a fixed `delay`
//! between them. [`retry`] runs an async operation under a policy and stops
//! early on errors the caller classifies as permanent.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

/// Bounded retry policy: at most `max_attempts` tries, `delay` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Serializable form of a [`RetryPolicy`] used in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl RetrySettings {
    pub const fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Attempts actually made (1..=max_attempts).
    pub attempts: u32,
    /// The error from the last attempt.
    pub error: E,
}

/// Run `op` under `policy`.
///
/// `op` receives the 1-based attempt number. After a failure for which
/// `is_retryable` returns true, waits `policy.delay()` and tries again until
/// the attempt budget is spent. A non-retryable failure ends immediately.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let retryable = is_retryable(&error);
                tracing::warn!(
                    operation = label,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    retryable,
                    error = %error,
                    "attempt failed"
                );

                if !retryable || attempt >= policy.max_attempts() {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                    });
                }

                if !policy.delay().is_zero() {
                    tokio::time::sleep(policy.delay()).await;
                }
                attempt += 1;
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
