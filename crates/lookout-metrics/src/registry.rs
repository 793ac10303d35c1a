//! Metric primitives and the service registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default histogram buckets, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gauge that can move both ways.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct HistogramState {
    /// Non-cumulative count per bucket; the last slot is `+Inf`.
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

/// Fixed-bucket histogram.
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    state: Mutex<HistogramState>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }
}

impl Histogram {
    pub fn with_buckets(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            state: Mutex::new(HistogramState {
                counts: vec![0; bounds.len() + 1],
                sum: 0.0,
                count: 0,
            }),
        }
    }

    pub fn observe(&self, value: f64) {
        let slot = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        let mut state = self.lock();
        state.counts[slot] += 1;
        state.sum += value;
        state.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.lock().count
    }

    pub fn sum(&self) -> f64 {
        self.lock().sum
    }

    /// Cumulative `(upper bound, count)` pairs, ending with `+Inf`.
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        let state = self.lock();
        let mut running = 0;
        self.bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(state.counts.iter())
            .map(|(bound, count)| {
                running += count;
                (bound, running)
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HistogramState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A named metric with one child per distinct label-value set.
#[derive(Debug)]
pub struct Family<M> {
    name: String,
    help: &'static str,
    labels: &'static [&'static str],
    children: Mutex<BTreeMap<Vec<String>, Arc<M>>>,
}

impl<M: Default> Family<M> {
    pub fn new(name: String, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            labels,
            children: Mutex::new(BTreeMap::new()),
        }
    }

    /// Child for the given label values, created on first use.
    ///
    /// Values are matched positionally against the family's label names;
    /// missing trailing values are recorded as empty strings.
    pub fn with(&self, values: &[&str]) -> Arc<M> {
        let key: Vec<String> = (0..self.labels.len())
            .map(|i| values.get(i).copied().unwrap_or_default().to_string())
            .collect();
        let mut children = self
            .children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        children.entry(key).or_default().clone()
    }
}

impl<M> Family<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }

    pub fn label_names(&self) -> &'static [&'static str] {
        self.labels
    }

    /// Snapshot of all children, in label order.
    pub fn children(&self) -> Vec<(Vec<String>, Arc<M>)> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

const CHECK_LABELS: &[&str] = &["project", "check"];
const REQUEST_LABELS: &[&str] = &["method", "endpoint", "status", "project", "check"];

/// Every metric the service exposes.
#[derive(Debug)]
pub struct Metrics {
    pub lock_wait: Family<Histogram>,
    pub check_run_duration: Family<Histogram>,
    pub parallelism: Family<Gauge>,
    pub request_duration: Family<Histogram>,
    pub request_summary: Family<Counter>,
    pub scheduler_lag: Family<Histogram>,
}

impl Metrics {
    pub fn new(prefix: &str) -> Self {
        let name = |suffix: &str| {
            if prefix.is_empty() {
                suffix.to_string()
            } else {
                format!("{prefix}_{suffix}")
            }
        };
        Self {
            lock_wait: Family::new(
                name("lock_wait_seconds"),
                "Time spent waiting for a check's cache lock.",
                CHECK_LABELS,
            ),
            check_run_duration: Family::new(
                name("check_run_duration_seconds"),
                "Duration of check executions.",
                CHECK_LABELS,
            ),
            parallelism: Family::new(
                name("parallelism_gauge"),
                "Permits currently held per concurrency budget.",
                &["type"],
            ),
            request_duration: Family::new(
                name("request_duration_seconds"),
                "HTTP request latency.",
                REQUEST_LABELS,
            ),
            request_summary: Family::new(
                name("request_summary"),
                "HTTP requests served.",
                REQUEST_LABELS,
            ),
            scheduler_lag: Family::new(
                name("scheduler_lag_seconds"),
                "How late periodic wake-ups of the runtime fire.",
                &["loop_name"],
            ),
        }
    }
}
