//! Counting concurrency limits.

use std::future::Future;
use std::sync::Arc;

use lookout_metrics::{Gauge, Metrics};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::parallel::Cancelled;

/// Bounded gate on concurrent operations.
///
/// Cloning shares the same budget. When a gauge is attached it tracks the
/// number of permits currently held.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
    gauge: Option<Arc<Gauge>>,
}

impl ConcurrencyLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            gauge: None,
        }
    }

    pub fn instrumented(max: usize, gauge: Arc<Gauge>) -> Self {
        Self {
            gauge: Some(gauge),
            ..Self::new(max)
        }
    }

    /// Wait for a free permit. The permit is returned when dropped.
    pub async fn acquire(&self) -> Result<Permit, Cancelled> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Cancelled)?;
        if let Some(gauge) = &self.gauge {
            gauge.inc();
        }
        Ok(Permit {
            _permit: permit,
            gauge: self.gauge.clone(),
        })
    }

    /// Run `fut` while holding a permit.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        let _permit = self.acquire().await?;
        Ok(fut.await)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }
}

/// A held permit of a [`ConcurrencyLimiter`].
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    gauge: Option<Arc<Gauge>>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(gauge) = &self.gauge {
            gauge.dec();
        }
    }
}

/// The process-wide budgets.
///
/// `request` bounds outbound HTTP calls, `worker` bounds parallel units of
/// work inside checks, and `checks` bounds how many checks a batch endpoint
/// runs at once. `checks` must stay separate from `worker`: checks running
/// in a batch take worker permits themselves.
#[derive(Debug, Clone)]
pub struct Limits {
    pub request: ConcurrencyLimiter,
    pub worker: ConcurrencyLimiter,
    pub checks: ConcurrencyLimiter,
}

impl Limits {
    pub fn new(request: usize, worker: usize, checks: usize, metrics: &Metrics) -> Self {
        Self {
            request: ConcurrencyLimiter::instrumented(
                request,
                metrics.parallelism.with(&["request"]),
            ),
            worker: ConcurrencyLimiter::instrumented(worker, metrics.parallelism.with(&["worker"])),
            checks: ConcurrencyLimiter::instrumented(checks, metrics.parallelism.with(&["checks"])),
        }
    }
}
