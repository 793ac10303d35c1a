//! Exponential backoff retries for transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// How an error should be treated by [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Timeouts, refused or reset connections.
    Transient,
    /// The server answered with an error status.
    Status,
    /// Anything retrying cannot fix.
    Permanent,
}

pub trait Retryable {
    fn retry_class(&self) -> RetryClass;
}

/// Retries transient errors with exponential backoff and full jitter.
///
/// Attempt `n` (zero-based) waits a random delay in
/// `[0, min(max_delay, base_delay * 2^n)]` before the next try. Error
/// statuses are only retried when [`RetryPolicy::retry_on_status`] is set.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    retry_on_status: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            retry_on_status: false,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn retry_on_status(mut self, enabled: bool) -> Self {
        self.retry_on_status = enabled;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn should_retry<E: Retryable>(&self, err: &E) -> bool {
        match err.retry_class() {
            RetryClass::Transient => true,
            RetryClass::Status => self.retry_on_status,
            RetryClass::Permanent => false,
        }
    }

    /// Randomized delay before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let cap_ms = cap.as_millis() as u64;
        if cap_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    /// The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && self.should_retry(&err) => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    debug!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Flaky(RetryClass);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl Retryable for Flaky {
        fn retry_class(&self) -> RetryClass {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(2);
        let result = policy
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(Flaky(RetryClass::Transient))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), Flaky> = RetryPolicy::new(2)
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err(Flaky(RetryClass::Transient)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn status_errors_need_opt_in() {
        let calls = Cell::new(0);
        let op = || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(Flaky(RetryClass::Status)) }
        };
        let _ = RetryPolicy::new(2).run(op).await;
        assert_eq!(calls.get(), 1);

        calls.set(0);
        let op = || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(Flaky(RetryClass::Status)) }
        };
        let _ = RetryPolicy::new(2).retry_on_status(true).run(op).await;
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let _: Result<(), Flaky> = RetryPolicy::new(5)
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err(Flaky(RetryClass::Permanent)) }
            })
            .await;
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(10)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250));
        for attempt in 0..10 {
            let delay = policy.backoff(attempt);
            assert!(delay <= Duration::from_millis(250), "attempt {attempt}: {delay:?}");
        }
        assert!(policy.backoff(0) <= Duration::from_millis(100));
        assert_eq!(
            RetryPolicy::new(1).with_base_delay(Duration::ZERO).backoff(3),
            Duration::ZERO
        );
    }
}
