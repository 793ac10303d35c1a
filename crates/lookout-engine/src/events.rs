//! Synchronous in-process publish/subscribe for check events.
//!
//! Listeners are registered at startup and called in registration order on
//! the emitting task. Each call is isolated: an error or a panic in one
//! listener is logged and the remaining listeners still run.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use lookout_core::CheckOutcome;
use tracing::error;

use crate::check::Check;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A check body was executed (not served from cache).
    CheckRun,
    /// A check's success flag changed, or it failed for the first time.
    CheckStateChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CheckRun => "check:run",
            EventKind::CheckStateChanged => "check:state:changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CheckEvent {
    pub kind: EventKind,
    pub check: Arc<Check>,
    pub result: CheckOutcome,
}

pub type Listener = Arc<dyn Fn(&CheckEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default, Clone)]
pub struct EventBus {
    listeners: Vec<(EventKind, Listener)>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: EventKind, listener: F)
    where
        F: Fn(&CheckEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.push((kind, Arc::new(listener)));
    }

    /// Call every listener registered for `event.kind`.
    pub fn emit(&self, event: &CheckEvent) {
        for (kind, listener) in &self.listeners {
            if *kind != event.kind {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    event = %event.kind,
                    check = %event.check.identifier(),
                    error = %format!("{e:#}"),
                    "event listener failed"
                ),
                Err(_) => error!(
                    event = %event.kind,
                    check = %event.check.identifier(),
                    "event listener panicked"
                ),
            }
        }
    }
}
