//! Scheduler lag observer.
//!
//! Sleeps for a fixed interval in a loop and records how much later than
//! requested each wake-up fires. A busy or blocked runtime shows up as a
//! growing lag.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::registry::Histogram;

/// Run until `shutdown` changes, observing wake-up lag into `histogram`.
pub async fn observe_scheduler_lag(
    histogram: Arc<Histogram>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "scheduler lag observer started");

    loop {
        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let lag = started.elapsed().saturating_sub(interval);
                histogram.observe(lag.as_secs_f64());
                if lag > interval {
                    warn!(lag_ms = lag.as_millis() as u64, "event loop is lagging");
                }
            }
            _ = shutdown.changed() => {
                info!("scheduler lag observer shutting down");
                break;
            }
        }
    }
}
