//! lookout-insights — context attached to check reports.
//!
//! Both collaborators read through the shared result cache under their own
//! keys, so one upstream fetch serves every check until its TTL runs out.
//!
//! ```text
//! BugTracker::fetch(project, name)
//!   └── cache "bugtracker-list" ── miss ──► GET {url}/rest/bug?whiteboard=...
//!         └── filter by "project/name", open first, newest first
//!
//! History::fetch(project, name)
//!   └── cache "scalar-history" ── miss ──► HistorySource::fetch_rows(days)
//!         └── points of "project/name"
//! ```

pub mod bugtracker;
pub mod history;

pub use bugtracker::{BugInfo, BugTracker};
pub use history::{DisabledHistory, History, HistoryPoint, HistoryRow, HistorySource};
