//! lookout-engine — the check execution engine.
//!
//! Runs configured checks on demand, caches their results per TTL, and
//! guarantees that a given check + parameter combination executes at most
//! once at a time.
//!
//! # Architecture
//!
//! ```text
//! CheckRunner::run(check, force)
//!   ├── CacheStore        get / lock(key) / set(key, result, ttl)
//!   ├── Check::execute    CheckModule::run(ctx, params)
//!   │     └── CheckContext
//!   │           ├── Fetcher            request permit → redact → retry
//!   │           │     ├── ConcurrencyLimiter ("request")
//!   │           │     └── RetryPolicy
//!   │           └── ParallelExecutor   ConcurrencyLimiter ("worker")
//!   └── EventBus          check:run, check:state:changed
//!         ├── log_result          → target "check.result"
//!         └── alert_state_change  → target "check.alert"
//! ```

pub mod check;
pub mod error;
pub mod events;
pub mod fetch;
pub mod limiter;
pub mod listeners;
pub mod parallel;
pub mod retry;
pub mod runner;

pub use check::{Check, CheckContext, CheckInfo, CheckModule, Checks, LookupError, ModuleRegistry};
pub use error::{FetchError, FetchResult, RequestInfo, RunError, RunResult};
pub use events::{CheckEvent, EventBus, EventKind, Listener};
pub use fetch::{Fetcher, RawResponse};
pub use limiter::{ConcurrencyLimiter, Limits, Permit};
pub use parallel::{Cancelled, ParallelExecutor};
pub use retry::{RetryClass, RetryPolicy, Retryable};
pub use runner::CheckRunner;
