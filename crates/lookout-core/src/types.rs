//! Result types shared by the engine, cache and API layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verdict returned by a check body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub success: bool,
    pub data: Value,
}

impl CheckOutcome {
    pub fn new(success: bool, data: impl Into<Value>) -> Self {
        Self {
            success,
            data: data.into(),
        }
    }

    pub fn pass(data: impl Into<Value>) -> Self {
        Self::new(true, data)
    }

    pub fn fail(data: impl Into<Value>) -> Self {
        Self::new(false, data)
    }
}

/// A cached check execution: when it ran, its verdict and how long it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub datetime: DateTime<Utc>,
    pub success: bool,
    pub data: Value,
    /// Wall-clock duration of the check body, in seconds.
    pub duration: f64,
}

impl CheckResult {
    pub fn new(datetime: DateTime<Utc>, outcome: CheckOutcome, duration: f64) -> Self {
        Self {
            datetime,
            success: outcome.success,
            data: outcome.data,
            duration,
        }
    }

    pub fn outcome(&self) -> CheckOutcome {
        CheckOutcome::new(self.success, self.data.clone())
    }

    /// Duration rounded to whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.duration * 1000.0).round().max(0.0) as u64
    }
}
