//! # tiercache
//!
//! A versioned hybrid cache engine for Rust: an in-process keyed store that
//! transparently spans memory and disk, with a companion size- and
//! age-bounded blob cache for fetched remote content.
//!
//! ## Features
//!
//! - Per-entry version tagging for automatic invalidation
//! - Per-key revision counters for cheap change detection
//! - List-valued entries with push/pop semantics
//! - Disk-resident entries selected per key (`$` prefix), mirrored through
//!   an atomically written one-file-per-key store
//! - A deferred-write queue applied on explicit demand
//! - A structure-preserving codec (bytes, tuples, sets, nested maps) over a
//!   versioned JSON envelope
//! - Thread-safe concurrent access; async variants for all disk-bound
//!   operations
//!
//! ## Quick start
//!
//! ```rust
//! use tiercache::{Cache, Value};
//!
//! let cache = Cache::new();
//!
//! cache.set("answer", 42)?;
//! assert_eq!(cache.get("answer")?, Some(Value::from(42)));
//!
//! // Counters start from zero
//! assert_eq!(cache.inc("hits")?, 1);
//!
//! // Revision counters detect changes without comparing values
//! let before = cache.get_revision("answer");
//! cache.set("answer", 43)?;
//! assert!(cache.get_revision("answer") > before);
//! # Ok::<(), tiercache::CacheError>(())
//! ```
//!
//! ## Disk-resident entries
//!
//! ```no_run
//! use tiercache::{Cache, CacheConfig};
//!
//! let cache = Cache::with_config(
//!     CacheConfig::builder().cache_dir("/var/cache/myapp").build(),
//! )?;
//!
//! // The $ prefix routes the entry to the disk tier
//! cache.set("$report", "survives the process")?;
//! # Ok::<(), tiercache::CacheError>(())
//! ```
//!
//! ## Blob cache
//!
//! ```rust
//! use std::time::Duration;
//! use tiercache::web::{WebCache, WebCacheConfig};
//!
//! let blobs = WebCache::new(WebCacheConfig::default());
//! blobs.store("https://example.com/logo.png", b"\x89PNG...")?;
//! let fresh = blobs.fetch("https://example.com/logo.png", Duration::from_secs(3600));
//! assert!(fresh.is_some());
//! # Ok::<(), tiercache::CacheError>(())
//! ```

pub mod bundle;
pub mod cache;
pub mod error;
pub mod web;

// Re-export main types for convenience
pub use bundle::{bundle, unbundle, Value};
pub use cache::{
    global_cache, Cache, CacheConfig, CacheConfigBuilder, CacheEntry, CacheRef, DiskCache,
    KeyInfo, Minor,
};
pub use error::{CacheError, Result};
pub use web::{WebCache, WebCacheConfig};
