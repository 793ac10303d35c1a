//! lookout-metrics — in-process metrics for the lookout service.
//!
//! Counters and gauges are plain atomics; histograms keep fixed buckets
//! behind a mutex. Every metric lives in a labeled [`Family`], and the
//! [`Metrics`] registry owns the families the service records into.
//!
//! # Architecture
//!
//! ```text
//! Metrics
//!   ├── lock_wait_seconds            {project, check}
//!   ├── check_run_duration_seconds   {project, check}
//!   ├── parallelism_gauge            {type}
//!   ├── request_duration_seconds     {method, endpoint, status, project, check}
//!   ├── request_summary              {method, endpoint, status, project, check}
//!   └── scheduler_lag_seconds        {loop_name}
//!
//! render_prometheus() → text/plain for /__metrics__
//! observe_scheduler_lag() → background loop feeding scheduler_lag_seconds
//! ```

pub mod lag;
pub mod prometheus;
pub mod registry;

pub use lag::observe_scheduler_lag;
pub use prometheus::render_prometheus;
pub use registry::{Counter, Family, Gauge, Histogram, Metrics};
