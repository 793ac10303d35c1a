//! lookout-checks — built-in check modules.
//!
//! Modules are referenced from the checks file by their dotted name:
//!
//! ```text
//! checks.core.heartbeat         GET url, compare status
//! checks.core.latency           GET url, compare elapsed milliseconds
//! checks.core.headers           HEAD urls in parallel, compare headers
//! checks.core.deployed_version  server __version__ vs latest GitHub release
//! ```

use std::sync::Arc;

use lookout_engine::ModuleRegistry;

pub mod deployed_version;
pub mod headers;
pub mod heartbeat;
pub mod latency;

#[cfg(test)]
pub(crate) mod testing;

pub use deployed_version::DeployedVersion;
pub use headers::Headers;
pub use heartbeat::Heartbeat;
pub use latency::Latency;

/// Registry of every built-in module.
pub fn builtin_modules() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(Heartbeat));
    registry.register(Arc::new(Latency));
    registry.register(Arc::new(Headers));
    registry.register(Arc::new(DeployedVersion));
    registry
}
