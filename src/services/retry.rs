//! Generic retry with exponential backoff and jitter.
//!
//! Independent of what is being retried: the provider wraps each upstream
//! endpoint GET in this, with its own policy, so concurrent fetches back off
//! independently rather than in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Backoff parameters for [`retry_with_backoff`].
///
/// Sleep before attempt `n+1` is `base_delay * 2^n + random(0, jitter_max)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (so 4 = 1 initial + 3 retries).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            jitter_max: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff duration after a failed attempt (0-indexed), jitter included.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay * 2u32.saturating_pow(attempt);
        let jitter_ms = self.jitter_max.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        exp + jitter
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted,
/// returning the last error. `label` only feeds the log lines.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(label, attempt = attempt + 1, "retry succeeded");
                }
                return Ok(value);
            }
            Err(err) if attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    label,
                    attempt = attempt + 1,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(
                    label,
                    attempts = policy.max_attempts,
                    error = %err,
                    "all attempts exhausted"
                );
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            jitter_max: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(fast_policy(4), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(fast_policy(4), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("boom".to_string())
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(fast_policy(4), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always".to_string()) }
        })
        .await;
        assert_eq!(result, Err("always".to_string()));
        // 4 attempts total = 1 initial + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            jitter_max: Duration::ZERO,
        };
        let start = tokio::time::Instant::now();
        let _: Result<(), String> =
            retry_with_backoff(policy, "test", || async { Err("nope".to_string()) }).await;
        // Sleeps of 1s + 2s + 4s between the 4 attempts
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[test]
    fn test_backoff_within_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            jitter_max: Duration::from_millis(500),
        };
        for attempt in 0..3 {
            let base = Duration::from_secs(1 << attempt);
            let d = policy.backoff(attempt);
            assert!(d >= base, "attempt {attempt}: {d:?} < {base:?}");
            assert!(
                d <= base + Duration::from_millis(500),
                "attempt {attempt}: {d:?} above jitter ceiling"
            );
        }
    }
}
