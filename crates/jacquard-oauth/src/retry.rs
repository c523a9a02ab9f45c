//! Exponential backoff with jitter for token refresh retries (§4.10).
//!
//! Idiom matches the `with_retries` wrapper used by Redis-backed storage
//! elsewhere in the corpus, generalized to the specific backoff formula this
//! component needs: `base_delay * 2^(attempt-1)` capped at `max_delay`, plus
//! uniform jitter in `[0, 0.5 * delay)`.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;

/// Whether an error represents a condition worth retrying (transient network/5xx)
/// as opposed to one that won't resolve on its own (invalid_grant, bad client auth).
pub trait Retryable {
    fn retry_possible(&self) -> bool;
}

pub(crate) fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
    let base = policy.base_delay.saturating_mul(exp).min(policy.max_delay);
    let jitter_max = base.as_secs_f64() * 0.5;
    let jitter = rand::thread_rng().gen_range(0.0..jitter_max.max(f64::EPSILON));
    base + Duration::from_secs_f64(jitter)
}

/// Retry `attempt` according to `policy`, calling `on_retry` between attempts so
/// callers can log. Gives up once `retry_possible()` returns false or the retry
/// budget is exhausted, returning the last error either way.
pub async fn with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut attempt: F,
    mut on_retry: impl FnMut(u32, &E, Duration),
) -> core::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = core::result::Result<T, E>>,
    E: Retryable,
{
    let mut last_err;
    let mut n = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.retry_possible() || n >= policy.max_retries {
                    return Err(e);
                }
                let delay = backoff_delay(policy, n + 1);
                on_retry(n + 1, &e, delay);
                last_err = e;
                tokio::time::sleep(delay).await;
                n += 1;
                let _ = &last_err;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);
    impl Retryable for Flaky {
        fn retry_possible(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy::new()
            .max_retries(5)
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(400))
            .build();
        let d1 = backoff_delay(&policy, 1);
        let d3 = backoff_delay(&policy, 3);
        assert!(d1 >= Duration::from_millis(100));
        assert!(d3 <= Duration::from_millis(600)); // 400 cap + up to 50% jitter
    }

    #[tokio::test]
    async fn stops_on_non_retryable() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = with_backoff(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(false)) }
            },
            |_, _, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retry_budget() {
        let policy = RetryPolicy::new()
            .max_retries(2)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build();
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = with_backoff(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(true)) }
            },
            |_, _, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
