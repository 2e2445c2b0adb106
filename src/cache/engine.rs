//! In-memory cache engine with revision tracking and a disk-backed tier
//!
//! The engine keeps a lock-guarded key table in memory. Keys carrying the
//! `$` marker are mirrored to a [`DiskCache`] under the configured cache
//! directory; the table then holds at most a cached copy and a completed
//! `set` leaves both sides agreeing. Every successful write bumps the key's
//! revision counter, which collaborators use for cheap change detection.
//!
//! Compound operations (`pop`, `inc`, the deferred drain) run entirely on
//! the locked state through private `_locked` helpers, so no operation ever
//! takes the lock twice and all operations are linearizable.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::bundle::Value;
use crate::cache::disk::DiskCache;
use crate::cache::entry::{CacheEntry, DeferredUpdate};
use crate::cache::handle::CacheRef;
use crate::cache::keys::KeyInfo;
use crate::error::{CacheError, Result};

/// Configuration for a cache engine instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default version string, also used by the disk tier
    pub version: Option<String>,

    /// Directory for disk-resident entries; none disables the disk tier
    pub cache_dir: Option<PathBuf>,
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    version: Option<String>,
    cache_dir: Option<PathBuf>,
}

impl CacheConfigBuilder {
    /// Set the engine's default version string
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the directory backing disk-resident entries
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        CacheConfig {
            version: self.version,
            cache_dir: self.cache_dir,
        }
    }
}

/// Everything guarded by the engine lock
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    deferred: VecDeque<DeferredUpdate>,
    volatile: HashSet<String>,
    loaded: bool,
}

/// The versioned hybrid cache engine
pub struct Cache {
    state: Mutex<CacheState>,
    disk: Option<DiskCache>,
    version: Option<String>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create a memory-only engine
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                deferred: VecDeque::new(),
                volatile: HashSet::new(),
                loaded: false,
            }),
            disk: None,
            version: None,
        }
    }

    /// Create an engine from a configuration, opening the disk tier if a
    /// cache directory is configured
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        let disk = match &config.cache_dir {
            Some(dir) => Some(DiskCache::with_version(
                dir,
                config.version.as_deref().unwrap_or("1"),
            )?),
            None => None,
        };
        let mut cache = Self::new();
        cache.disk = disk;
        cache.version = config.version;
        Ok(cache)
    }

    /// The engine's default version string
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write or overwrite the entry under `key`, bumping its revision
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set_versioned(key, value, None, false)
    }

    /// Write with an explicit version and keep flag
    ///
    /// `keep` marks the entry to survive [`clear`](Self::clear). A write
    /// whose version differs from the stored one still replaces the entry;
    /// the old value is discarded.
    pub fn set_versioned(
        &self,
        key: &str,
        value: impl Into<Value>,
        version: Option<&str>,
        keep: bool,
    ) -> Result<()> {
        let info = KeyInfo::parse(key, version);
        let mut state = self.state();
        self.set_locked(&mut state, &info, value.into(), keep)?;
        Ok(())
    }

    /// Read the value under `key`; `None` on miss or version mismatch
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_versioned(key, None)
    }

    /// Read the value under `key`, constrained to a version
    pub fn get_versioned(&self, key: &str, version: Option<&str>) -> Result<Option<Value>> {
        let info = KeyInfo::parse(key, version);
        let mut state = self.state();
        self.get_locked(&mut state, &info)
    }

    /// Read the value under `key`, erroring when it is absent
    ///
    /// The strict counterpart of [`get`](Self::get), for callers that treat
    /// a miss as a bug rather than a default.
    pub fn require(&self, key: &str) -> Result<Value> {
        self.get(key)?
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))
    }

    /// Whether a live entry exists under `key`
    pub fn contains(&self, key: &str) -> bool {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        matches!(self.get_locked(&mut state, &info), Ok(Some(_)))
    }

    /// Number of entries in the table
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Remove the entry under `key`; returns how many entries were removed
    pub fn remove(&self, key: &str) -> Result<usize> {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        Ok(usize::from(self.remove_locked(&mut state, &info)?))
    }

    /// Remove a batch of keys; returns how many actually existed
    pub fn remove_many<I, S>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state();
        let mut removed = 0;
        for key in keys {
            let info = KeyInfo::parse(key.as_ref(), None);
            if self.remove_locked(&mut state, &info)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Increment the integer under `key` by 1, treating a missing key as 0
    pub fn inc(&self, key: &str) -> Result<i64> {
        self.inc_by(key, 1)
    }

    /// Increment the integer under `key` by `amount`
    pub fn inc_by(&self, key: &str, amount: i64) -> Result<i64> {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        self.inc_locked(&mut state, &info, amount)
    }

    /// Decrement the integer under `key` by 1
    pub fn dec(&self, key: &str) -> Result<i64> {
        self.inc_by(key, -1)
    }

    /// Decrement the integer under `key` by `amount`
    pub fn dec_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.inc_by(key, -amount)
    }

    /// Append one item to the list under `key`, creating the list if absent
    pub fn lpush(&self, key: &str, item: impl Into<Value>) -> Result<()> {
        self.lpush_many(key, [item.into()])
    }

    /// Append several items to the list under `key`
    pub fn lpush_many(
        &self,
        key: &str,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        self.lpush_locked(&mut state, &info, items.into_iter().collect())
    }

    /// Remove and return the last element of the list under `key`
    ///
    /// A scalar-valued key yields the whole value and deletes the key;
    /// callers rely on this polymorphic behavior. `None` when the key is
    /// absent or the list is empty.
    pub fn pop(&self, key: &str) -> Result<Option<Value>> {
        self.pop_at(key, -1)
    }

    /// Remove and return the element at `index` (negative counts from the end)
    pub fn pop_at(&self, key: &str, index: i64) -> Result<Option<Value>> {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        self.pop_locked(&mut state, &info, index)
    }

    /// Current revision of `key`; 0 when the key is absent
    pub fn get_revision(&self, key: &str) -> u64 {
        let info = KeyInfo::parse(key, None);
        let state = self.state();
        state
            .entries
            .get(&info.name)
            .map(|entry| entry.revision)
            .unwrap_or(0)
    }

    /// Bump and return the revision of `key` without touching the value
    ///
    /// Signals that the key's referent changed externally. 0 when the key
    /// is absent.
    pub fn increase_revision(&self, key: &str) -> u64 {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        match state.entries.get_mut(&info.name) {
            Some(entry) => {
                entry.revision += 1;
                entry.revision
            }
            None => 0,
        }
    }

    /// Return the cached value or compute, store and return it
    ///
    /// The computation runs under the table lock, so concurrent callers of
    /// the same key compute at most once.
    pub fn get_or_compute<F>(&self, key: &str, version: Option<&str>, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Value,
    {
        let info = KeyInfo::parse(key, version);
        let mut state = self.state();
        if let Some(value) = self.get_locked(&mut state, &info)? {
            return Ok(value);
        }
        let value = compute();
        self.set_locked(&mut state, &info, value.clone(), false)?;
        Ok(value)
    }

    /// Queue a `set` to be applied on the next [`apply_deferred`](Self::apply_deferred)
    ///
    /// Reads do not observe the update until the queue is drained.
    pub fn set_deferred(&self, key: &str, value: impl Into<Value>) {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        state.deferred.push_back(DeferredUpdate::Set {
            key: info,
            value: value.into(),
        });
    }

    /// Queue a list push for the next [`apply_deferred`](Self::apply_deferred)
    pub fn lpush_deferred(&self, key: &str, item: impl Into<Value>) {
        let info = KeyInfo::parse(key, None);
        let mut state = self.state();
        state.deferred.push_back(DeferredUpdate::Push {
            key: info,
            item: item.into(),
        });
    }

    /// Apply every queued update in enqueue order; returns how many ran
    ///
    /// The whole drain happens under the lock; no read interleaves
    /// mid-drain. The queue is empty afterwards.
    pub fn apply_deferred(&self) -> Result<usize> {
        let mut state = self.state();
        let queued: Vec<DeferredUpdate> = state.deferred.drain(..).collect();
        let applied = queued.len();
        for update in queued {
            match update {
                DeferredUpdate::Set { key, value } => {
                    let keep = self.current_keep(&state, &key);
                    self.set_locked(&mut state, &key, value, keep)?;
                }
                DeferredUpdate::Push { key, item } => {
                    self.lpush_locked(&mut state, &key, vec![item])?;
                }
            }
        }
        if applied > 0 {
            debug!(applied, "applied deferred cache updates");
        }
        Ok(applied)
    }

    /// Create a handle bound to `key`
    pub fn create_ref<'a>(&'a self, key: &str) -> CacheRef<'a> {
        CacheRef::new(self, key, false)
    }

    /// Create a handle whose writes route through the deferred queue
    pub fn create_ref_deferred<'a>(&'a self, key: &str) -> CacheRef<'a> {
        CacheRef::new(self, key, true)
    }

    /// Drop every entry not marked `keep`
    pub fn clear(&self) {
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.keep);
        debug!(removed = before - state.entries.len(), "cleared cache table");
    }

    /// Mark the engine loaded
    ///
    /// Loading an already-loaded engine is a contract violation and fails
    /// immediately.
    pub fn load(&self) -> Result<()> {
        let mut state = self.state();
        if state.loaded {
            return Err(CacheError::Lifecycle(
                "load() called on an already-loaded cache".to_string(),
            ));
        }
        state.loaded = true;
        info!("cache loaded");
        Ok(())
    }

    /// Unload the engine, dropping volatile and transient entries
    ///
    /// Disk entry files survive; the in-memory table keeps only entries
    /// marked `keep` that are not registered volatile. Unloading an engine
    /// that is not loaded fails immediately.
    pub fn unload(&self) -> Result<()> {
        let mut state = self.state();
        if !state.loaded {
            return Err(CacheError::Lifecycle(
                "unload() called on a cache that is not loaded".to_string(),
            ));
        }
        let volatile = std::mem::take(&mut state.volatile);
        state
            .entries
            .retain(|key, entry| entry.keep && !volatile.contains(key));
        state.deferred.clear();
        state.loaded = false;
        info!("cache unloaded");
        Ok(())
    }

    /// Whether the engine is currently loaded
    pub fn loaded(&self) -> bool {
        self.state().loaded
    }

    /// Register a member-scoped key (stored as `.name`) to be dropped on unload
    pub fn add_volatile(&self, name: &str) {
        let mut state = self.state();
        state.volatile.insert(format!(".{name}"));
    }

    /// Whether a member name is registered volatile
    pub fn is_volatile(&self, name: &str) -> bool {
        self.state().volatile.contains(&format!(".{name}"))
    }

    fn current_keep(&self, state: &CacheState, info: &KeyInfo) -> bool {
        state
            .entries
            .get(&info.name)
            .map(|entry| entry.keep)
            .unwrap_or(false)
    }

    fn set_locked(
        &self,
        state: &mut CacheState,
        info: &KeyInfo,
        value: Value,
        keep: bool,
    ) -> Result<u64> {
        if info.disk {
            match &self.disk {
                // Write through first: a failed disk write leaves both the
                // table and the mirror untouched.
                Some(disk) => disk.set_versioned(&info.name, &value, info.version.as_deref())?,
                None => warn!(key = %info.name, "disk-marked key on an engine without a cache directory"),
            }
        }
        let revision = match state.entries.get_mut(&info.name) {
            Some(entry) => {
                entry.replace(value, info.version.clone(), keep);
                entry.revision
            }
            None => {
                state.entries.insert(
                    info.name.clone(),
                    CacheEntry::new(value, info.version.clone(), keep),
                );
                1
            }
        };
        Ok(revision)
    }

    fn get_locked(&self, state: &mut CacheState, info: &KeyInfo) -> Result<Option<Value>> {
        if let Some(entry) = state.entries.get(&info.name) {
            if entry.matches_version(info.version.as_deref()) {
                return Ok(Some(entry.value.clone()));
            }
            return Ok(None);
        }
        if info.disk {
            if let Some(disk) = &self.disk {
                if let Some(value) = disk.get_versioned(&info.name, info.version.as_deref())? {
                    // Keep a cached copy so repeated reads stay in memory
                    state.entries.insert(
                        info.name.clone(),
                        CacheEntry::new(value.clone(), info.version.clone(), false),
                    );
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    fn remove_locked(&self, state: &mut CacheState, info: &KeyInfo) -> Result<bool> {
        let in_memory = state.entries.remove(&info.name).is_some();
        let on_disk = match (&self.disk, info.disk) {
            (Some(disk), true) => disk.delete(&info.name)?,
            _ => false,
        };
        Ok(in_memory || on_disk)
    }

    fn inc_locked(&self, state: &mut CacheState, info: &KeyInfo, amount: i64) -> Result<i64> {
        let current = match self.get_locked(state, info)? {
            None => 0,
            Some(Value::Int(n)) => n,
            Some(other) => {
                return Err(CacheError::NotAnInteger {
                    key: info.name.clone(),
                    kind: other.kind(),
                })
            }
        };
        let next = current + amount;
        let keep = self.current_keep(state, info);
        self.set_locked(state, info, Value::Int(next), keep)?;
        Ok(next)
    }

    fn lpush_locked(
        &self,
        state: &mut CacheState,
        info: &KeyInfo,
        items: Vec<Value>,
    ) -> Result<()> {
        let mut list = match self.get_locked(state, info)? {
            Some(Value::List(existing)) => existing,
            // A scalar under the key becomes the head of the new list
            Some(other) => vec![other],
            None => Vec::new(),
        };
        list.extend(items);
        let keep = self.current_keep(state, info);
        self.set_locked(state, info, Value::List(list), keep)?;
        Ok(())
    }

    fn pop_locked(
        &self,
        state: &mut CacheState,
        info: &KeyInfo,
        index: i64,
    ) -> Result<Option<Value>> {
        let Some(current) = self.get_locked(state, info)? else {
            return Ok(None);
        };
        match current {
            Value::List(mut items) => {
                let len = items.len() as i64;
                let at = if index < 0 { index + len } else { index };
                if at < 0 || at >= len {
                    return Ok(None);
                }
                let item = items.remove(at as usize);
                let keep = self.current_keep(state, info);
                self.set_locked(state, info, Value::List(items), keep)?;
                Ok(Some(item))
            }
            scalar => {
                self.remove_locked(state, info)?;
                Ok(Some(scalar))
            }
        }
    }
}

static GLOBAL_CACHE: Lazy<Cache> = Lazy::new(Cache::new);

/// The process-wide shared cache engine
///
/// Constructed lazily on first access; every call returns the identical
/// instance.
pub fn global_cache() -> &'static Cache {
    &GLOBAL_CACHE
}
