//! Bounded retry with exponential backoff for network operations.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Retry policy applied to loader installation and modpack metadata fetches.
///
/// Marketplace search is deliberately not routed through this: a failed
/// search degrades to an empty result list at the call site instead.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Run `op`, retrying on any failure with a doubling delay between
    /// attempts. The last failure is returned once attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= self.max_attempts {
                        log::error!("{} failed after {} attempts: {}", label, attempt, e);
                        return Err(e);
                    }

                    log::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn succeeds_on_third_attempt_with_doubling_delays() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_in = calls.clone();
        let start = Instant::now();
        let result = policy
            .run("flaky op", move || {
                let calls = calls_in.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        anyhow::bail!("transient failure {}", n);
                    }
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two waits: 50ms then 100ms.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn exhausted_attempts_return_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_in = calls.clone();
        let result: Result<()> = policy
            .run("doomed op", move || {
                let calls = calls_in.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    anyhow::bail!("failure {}", n)
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("failure 3"));
    }

    #[test]
    fn immediate_success_does_not_sleep() {
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let value = tokio_test::block_on(policy.run("instant op", || async { Ok(7) })).unwrap();

        assert_eq!(value, 7);
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
