//! lookout-cache — result cache shared by check runs and collaborators.
//!
//! A [`CacheStore`] maps string keys to JSON values with a per-entry TTL
//! and hands out one mutual-exclusion [`CacheLock`] per key. The lock is
//! what makes check execution single-flight: whoever holds it is the only
//! one allowed to recompute the entry.
//!
//! # Backends
//!
//! ```text
//! CacheStore
//!   ├── MemoryCache   HashMap<key, (expiry, value)>, lazy expiry on read,
//!   │                 one tokio Mutex per key kept for the process lifetime
//!   └── RedisCache    {prefix}:v1:{sha256(key)}:data  SET .. PX ttl
//!                     {prefix}:v1:{sha256(key)}:lock  SET .. NX PX lease,
//!                     polled up to a bounded wait, released by token
//! ```
//!
//! Raw keys can embed secret parameter values; the Redis backend only ever
//! stores their digest.

pub mod distributed;
pub mod error;
pub mod memory;
pub mod store;

pub use distributed::{RedisCache, redact_url};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use store::{CacheLock, CacheStore, CacheStoreExt};
