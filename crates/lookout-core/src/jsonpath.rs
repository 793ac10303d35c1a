//! Minimal dotted-path lookup into JSON values.
//!
//! Used to pull the plot scalar out of a check's `data`. Paths look like
//! `.`, `.latency`, or `.results.0.value`; numeric steps index arrays.

use serde_json::Value;

/// Resolve `path` against `data`, returning `None` when a step is missing.
pub fn extract_json<'a>(path: &str, data: &'a Value) -> Option<&'a Value> {
    let mut current = data;
    for step in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(step)?,
            Value::Array(items) => items.get(step.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
