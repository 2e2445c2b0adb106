//! # Hybrid Cache Engine
//!
//! This module implements the keyed store spanning memory and disk.
//!
//! ## Features
//!
//! - **Revision tracking**: every write bumps a per-key counter, so
//!   collaborators detect changes without comparing values
//! - **Version-qualified keys**: entries carry an opaque version tag;
//!   reads asking for another version miss, which turns stale data into
//!   ordinary cache misses
//! - **Hybrid residency**: a `$` key prefix mirrors the entry to a disk
//!   store, one hashed file per key, written atomically
//! - **List operations**: push/pop semantics on list-valued entries
//! - **Deferred writes**: updates can be queued and applied in order on an
//!   explicit drain call, invisible to reads until then
//!
//! ## Example
//!
//! ```rust
//! use tiercache::cache::Cache;
//! use tiercache::bundle::Value;
//!
//! let cache = Cache::new();
//! cache.set("greeting", "hello")?;
//! assert_eq!(cache.get("greeting")?, Some(Value::from("hello")));
//!
//! cache.lpush("jobs", "first")?;
//! cache.lpush("jobs", "second")?;
//! assert_eq!(cache.pop_at("jobs", 0)?, Some(Value::from("first")));
//! # Ok::<(), tiercache::CacheError>(())
//! ```

pub mod disk;
pub mod engine;
pub mod entry;
pub mod handle;
pub mod keys;

pub use disk::DiskCache;
pub use engine::{global_cache, Cache, CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, DeferredUpdate};
pub use handle::CacheRef;
pub use keys::{
    app_session_id, combine_version, key_and_version, override_app_session_id, KeyInfo, Minor,
};
