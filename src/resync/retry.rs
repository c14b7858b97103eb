//! Retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::Result;
use crate::runtime::Runtime;
use crate::types::ResyncConfig;

/// Information about one finished attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptInfo {
    /// 1-based attempt number
    pub attempt: u32,
    /// Time the attempt took
    pub elapsed: Duration,
    /// Whether another attempt will follow
    pub will_retry: bool,
}

/// Bounded retry policy
///
/// Attempt `n` (1-based) that fails with a recoverable error is followed by
/// a wait of `base * 2^(n-1)` plus up to `jitter` of random delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Backoff base
    pub base: Duration,
    /// Random jitter bound
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub fn new(max_attempts: u32, base: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            jitter,
        }
    }

    /// Policy from resync settings
    #[must_use]
    pub fn from_config(config: &ResyncConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base, config.backoff_jitter)
    }

    /// Wait after the failed attempt `attempt` (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.base.saturating_mul(1 << exponent);
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        base.saturating_add(jitter)
    }

    /// Run `op` until it succeeds, fails unrecoverably, or runs out of attempts
    ///
    /// `notify` sees every attempt's result before any backoff wait.
    ///
    /// # Errors
    ///
    /// Returns the last error once no further attempt will be made.
    pub async fn retry<T, F, Fut, N>(&self, mut op: F, mut notify: N) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        N: FnMut(&AttemptInfo, &Result<T>),
    {
        let mut attempt = 1;
        loop {
            let started = tokio::time::Instant::now();
            let result = op(attempt).await;
            let will_retry = match &result {
                Ok(_) => false,
                Err(e) => e.is_recoverable() && attempt < self.max_attempts,
            };
            let info = AttemptInfo {
                attempt,
                elapsed: started.elapsed(),
                will_retry,
            };
            notify(&info, &result);

            match result {
                Ok(value) => return Ok(value),
                Err(e) if will_retry => {
                    let wait = self.backoff(attempt);
                    tracing::debug!(
                        attempt,
                        error = %e,
                        backoff_ms = wait.as_millis(),
                        "Retry: attempt failed, backing off"
                    );
                    Runtime::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Retry: giving up");
                    return Err(e);
                }
            }
        }
    }
}
