//! Retry policy shared by every caller that re-sends a message

use crate::config::MessagingConfig;
use std::future::Future;
use std::time::Duration;

/// How many times an operation is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub exponential: bool,
}

impl RetryPolicy {
    /// A single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            exponential: false,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            exponential: false,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            exponential: true,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&MessagingConfig> for RetryPolicy {
    fn from(config: &MessagingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            exponential: config.exponential_backoff,
        }
    }
}

/// The last error of an operation that never succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, returns a non-retryable error, or the policy
/// runs out of attempts
///
/// `op` receives the 1-based attempt number. No delay follows the final
/// attempt.
///
/// # Example
///
/// ```
/// use listing_harvester::messaging::{with_retry, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn demo() {
/// let result = with_retry(
///     RetryPolicy::fixed(3, Duration::from_millis(1)),
///     |_: &&str| true,
///     |attempt| async move { if attempt < 3 { Err("not yet") } else { Ok(attempt) } },
/// )
/// .await;
/// assert_eq!(result.unwrap(), 3);
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut, R>(
    policy: RetryPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_attempts || !is_retryable(&error) {
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                    });
                }

                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    "Attempt {}/{} failed, retrying in {:?}",
                    attempt,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
