//! Async retry utilities with exponential backoff

use std::time::Duration;

/// Default maximum retry attempts for connection setup
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay in milliseconds for exponential backoff
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;

/// Upper bound for a single backoff delay
const MAX_DELAY_MS: u64 = 10_000;

/// Delay before the next attempt, doubling per attempt and capped
fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_delay_ms.saturating_mul(factor).min(MAX_DELAY_MS))
}

/// Retry an async operation with exponential backoff.
///
/// Returns the operation's value on success, or the last error once
/// `max_attempts` is exhausted. `what` names the operation in logs.
pub async fn retry_with_backoff_async<F, Fut, T, E>(
    what: &str,
    max_attempts: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempts >= max_attempts {
                    tracing::error!(
                        error = %e,
                        attempts,
                        operation = what,
                        "Giving up after repeated failures"
                    );
                    return Err(e);
                }
                let delay = backoff_delay(base_delay_ms, attempts);
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    operation = what,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_on_first_try() {
        let result = retry_with_backoff_async("op", 3, 1, || async { Ok::<_, &str>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff_async("op", 3, 1, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 2 { Err("transient error") } else { Ok(n) } }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_failure_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff_async("op", 3, 1, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("persistent error") }
        })
        .await;
        assert_eq!(result, Err("persistent error"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 4), Duration::from_millis(800));
        assert_eq!(backoff_delay(100, 30), Duration::from_millis(MAX_DELAY_MS));
    }
}
