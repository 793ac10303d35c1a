//! Bounded parallel execution with ordered results.

use std::future::Future;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

use crate::limiter::ConcurrencyLimiter;

/// An operation was aborted before producing a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Runs batches of independent operations under a [`ConcurrencyLimiter`].
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    limiter: ConcurrencyLimiter,
}

impl ParallelExecutor {
    pub fn new(limiter: ConcurrencyLimiter) -> Self {
        Self { limiter }
    }

    /// Run every future, at most `limiter.max()` at a time, and return their
    /// values in input order.
    ///
    /// The first error to complete aborts the remaining operations and is
    /// returned once they have unwound. Aborted operations are not reported.
    /// A panicking operation resumes its panic in the caller. Dropping the
    /// returned future aborts everything still running.
    pub async fn run<T, E, F>(&self, futures: Vec<F>) -> Result<Vec<T>, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<Cancelled> + Send + 'static,
    {
        let total = futures.len();
        let mut set = JoinSet::new();
        for (index, fut) in futures.into_iter().enumerate() {
            let limiter = self.limiter.clone();
            set.spawn(async move {
                let _permit = limiter.acquire().await?;
                fut.await.map(|value| (index, value))
            });
        }

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut first_error: Option<E> = None;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((index, value))) => slots[index] = Some(value),
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        debug!(pending = set.len(), "parallel operation failed, aborting the rest");
                        first_error = Some(err);
                        set.abort_all();
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| E::from(Cancelled)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Failed(u32),
        Cancelled,
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    #[tokio::test]
    async fn results_follow_input_order() {
        let executor = ParallelExecutor::new(ConcurrencyLimiter::new(4));
        let futures: Vec<_> = [30u64, 5, 20, 1]
            .into_iter()
            .map(|ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, TestError>(ms)
            })
            .collect();
        assert_eq!(executor.run(futures).await.unwrap(), vec![30, 5, 20, 1]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let executor = ParallelExecutor::new(ConcurrencyLimiter::new(2));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let futures: Vec<_> = (0..10)
            .map(|i| {
                let inside = inside.clone();
                let peak = peak.clone();
                async move {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(3)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TestError>(i)
                }
            })
            .collect();
        let results = executor.run(futures).await.unwrap();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn an_error_is_surfaced() {
        let executor = ParallelExecutor::new(ConcurrencyLimiter::new(3));
        let futures: Vec<_> = (0..6u32)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(u64::from(i))).await;
                if i % 2 == 1 {
                    Err(TestError::Failed(i))
                } else {
                    Ok(i)
                }
            })
            .collect();
        let err = executor.run(futures).await.unwrap_err();
        assert!(matches!(err, TestError::Failed(_)));
    }

    #[tokio::test]
    async fn error_aborts_slow_operations() {
        let executor = ParallelExecutor::new(ConcurrencyLimiter::new(2));
        let finished = Arc::new(AtomicUsize::new(0));
        let slow = {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, TestError>(0)
            }
        };
        let futures: Vec<std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>> + Send>>> =
            vec![Box::pin(slow), Box::pin(async { Err(TestError::Failed(1)) })];

        let started = std::time::Instant::now();
        let err = executor.run(futures).await.unwrap_err();
        assert_eq!(err, TestError::Failed(1));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_batch() {
        let executor = ParallelExecutor::new(ConcurrencyLimiter::new(1));
        let futures: Vec<std::future::Ready<Result<u8, TestError>>> = Vec::new();
        assert!(executor.run(futures).await.unwrap().is_empty());
    }
}
