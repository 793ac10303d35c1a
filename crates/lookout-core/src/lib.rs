//! lookout-core — shared types for the lookout health-check service.
//!
//! Holds everything the other crates agree on without depending on a
//! runtime: the process [`Settings`], the checks file format, the typed
//! parameter schema used to validate check configuration, and the
//! [`CheckResult`] tuple that gets cached and served.
//!
//! # Checks file
//!
//! ```toml
//! [checks.core.heartbeat]
//! description = "Service responds"
//! module = "checks.core.heartbeat"
//! ttl = 60
//! tags = ["critical"]
//! params.url = "${SERVICE_URL}/__heartbeat__"
//! ```

pub mod config;
pub mod error;
pub mod jsonpath;
pub mod params;
pub mod settings;
pub mod types;

pub use config::{CheckDefinition, CheckEntry, ChecksFile};
pub use error::{ConfigError, ConfigResult};
pub use jsonpath::extract_json;
pub use params::{ParamKind, ParamSchema, ParamSpec, Params};
pub use settings::{LogFormat, Settings};
pub use types::{CheckOutcome, CheckResult};
