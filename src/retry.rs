//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included (at least 1).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(2),
        }
    }

    /// Delay after the zero-based `attempt` failed: base * 2^attempt, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or the policy is exhausted; the last
/// error is returned.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt + 1 >= policy.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "failed, no more retries"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
