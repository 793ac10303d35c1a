//! Built-in event listeners.

use chrono::Utc;
use lookout_core::extract_json;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::events::{CheckEvent, EventBus, EventKind};

/// Register the default listeners on `bus`.
pub fn register_defaults(bus: &mut EventBus) {
    bus.on(EventKind::CheckRun, log_result);
    bus.on(EventKind::CheckStateChanged, alert_state_change);
}

/// One `check.result` record per execution, for history pipelines.
pub fn log_result(event: &CheckEvent) -> anyhow::Result<()> {
    let check = &event.check;
    let plot = check
        .plot()
        .and_then(|path| plot_value(path, &event.result.data));
    info!(
        target: "check.result",
        time = %Utc::now().to_rfc3339(),
        project = %check.project,
        check = %check.name,
        tags = ?check.tags,
        success = event.result.success,
        data = %serde_json::to_string(&event.result.data)?,
        plot,
    );
    Ok(())
}

/// `check.alert` record when a check starts failing or recovers.
pub fn alert_state_change(event: &CheckEvent) -> anyhow::Result<()> {
    let identifier = event.check.identifier();
    let data = serde_json::to_string(&event.result.data)?;
    if event.result.success {
        info!(target: "check.alert", check = %identifier, data = %data, "{identifier} recovered");
    } else {
        error!(target: "check.alert", check = %identifier, data = %data, "{identifier} is failing");
    }
    Ok(())
}

/// Scalar at `path`, rounded to two decimals. Checks that put an error
/// string in `data` on failure have no scalar.
fn plot_value(path: &str, data: &Value) -> Option<f64> {
    let value = extract_json(path, data)?;
    let scalar = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match scalar {
        Some(v) => Some((v * 100.0).round() / 100.0),
        None => {
            warn!(path, "plot value is not a number");
            None
        }
    }
}
