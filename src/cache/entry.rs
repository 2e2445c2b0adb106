//! Cache entry and deferred update records

use chrono::{DateTime, Utc};

use crate::bundle::Value;
use crate::cache::keys::KeyInfo;

/// One key's record in the engine table
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value
    pub value: Value,

    /// Version tag attached at write time; a read asking for a different
    /// version treats the entry as missing
    pub version: Option<String>,

    /// Monotonically increasing change counter, starting at 1 on first write
    pub revision: u64,

    /// Survives operations that clear transient entries
    pub keep: bool,

    /// When the entry was first written
    pub created_at: DateTime<Utc>,

    /// When the entry was last written
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a fresh entry at revision 1
    pub fn new(value: Value, version: Option<String>, keep: bool) -> Self {
        let now = Utc::now();
        Self {
            value,
            version,
            revision: 1,
            keep,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the value and version, bumping the revision
    ///
    /// A version change still replaces the old value; the entry is rewritten,
    /// not forked.
    pub fn replace(&mut self, value: Value, version: Option<String>, keep: bool) {
        self.value = value;
        self.version = version;
        self.keep = keep;
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    /// Whether the entry satisfies a version constraint
    ///
    /// An entry written without a version matches any request; a versioned
    /// entry matches only the exact same version.
    pub fn matches_version(&self, requested: Option<&str>) -> bool {
        match (&self.version, requested) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(stored), Some(requested)) => stored == requested,
        }
    }
}

/// A write queued through the deferred path
///
/// Deferred updates do not touch the table until the engine is explicitly
/// asked to apply them, in enqueue order.
#[derive(Debug, Clone)]
pub enum DeferredUpdate {
    /// Replace the value under a key
    Set { key: KeyInfo, value: Value },
    /// Append one item to the list under a key
    Push { key: KeyInfo, item: Value },
}
