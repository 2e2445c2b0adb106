//! Disk store: one file per key, versioned envelopes, atomic replacement
//!
//! Keys are mapped to filenames through a content hash, so arbitrary key
//! strings (path separators included) are safe on any filesystem. Writes go
//! to a temporary file first and are renamed into place; a crash mid-write
//! never leaves a corrupt visible entry. Readers of a concurrently replaced
//! entry see either the old or the new file, always whole.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::bundle::{bundle_versioned, unbundle_versioned, Value};
use crate::cache::keys::KeyInfo;
use crate::error::{CacheError, Result};

/// Default store version when none is configured
const DEFAULT_VERSION: &str = "1";

/// A disk-backed key/value store of versioned envelopes
///
/// Cloning is cheap and clones share the same directory; the store itself
/// holds no open handles.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    version: String,
}

impl DiskCache {
    /// Open a store under `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_version(dir, DEFAULT_VERSION)
    }

    /// Open a store with its own default version string
    ///
    /// Entries written without an explicit version carry the store version,
    /// and reads compare against it; two stores with different versions over
    /// the same directory do not see each other's entries.
    pub fn with_version(dir: impl Into<PathBuf>, version: impl ToString) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self {
            dir,
            version: version.to_string(),
        })
    }

    /// The store's default version string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The store's root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic filename for an arbitrary key string
    pub fn encode_name(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(Self::encode_name(name))
    }

    /// Read the value stored under `key`
    ///
    /// `Ok(None)` for a missing or unreadable file or a version mismatch;
    /// never an error for a missing key. Undecodable envelopes propagate.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_versioned(key, None)
    }

    /// Read the value stored under `key`, constrained to a version
    pub fn get_versioned(&self, key: &str, version: Option<&str>) -> Result<Option<Value>> {
        let info = KeyInfo::parse(key, version);
        let path = self.entry_path(&info.name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };
        let (value, stored) = unbundle_versioned(&bytes)?;
        let requested = info.version.as_deref().unwrap_or(&self.version);
        match stored.as_deref() {
            None => Ok(Some(value)),
            Some(stored) if stored == requested => Ok(Some(value)),
            Some(stored) => {
                debug!(key, stored, requested, "disk entry version mismatch");
                Ok(None)
            }
        }
    }

    /// Write `value` under `key` with the store's default version
    pub fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.set_versioned(key, value, None)
    }

    /// Write `value` under `key` with an explicit version
    pub fn set_versioned(&self, key: &str, value: &Value, version: Option<&str>) -> Result<()> {
        let info = KeyInfo::parse(key, version);
        let stored = info.version.as_deref().unwrap_or(&self.version);
        let bytes = bundle_versioned(value, Some(stored))?;

        let path = self.entry_path(&info.name);
        let mut temp =
            NamedTempFile::new_in(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        temp.as_file_mut()
            .write_all(&bytes)
            .map_err(|e| CacheError::io(temp.path(), e))?;
        temp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;
        debug!(key, path = %path.display(), "wrote disk entry");
        Ok(())
    }

    /// Remove the entry under `key`; true iff a file existed and was removed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let info = KeyInfo::parse(key, None);
        let path = self.entry_path(&info.name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Remove every entry file under the store directory
    pub fn clear(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove entry file");
            } else {
                removed += 1;
            }
        }
        debug!(dir = %self.dir.display(), removed, "cleared disk store");
        Ok(())
    }

    /// Whether an entry file exists under `key` (no version check)
    pub fn contains(&self, key: &str) -> bool {
        let info = KeyInfo::parse(key, None);
        self.entry_path(&info.name).exists()
    }

    /// Async variant of [`get`](Self::get)
    ///
    /// The blocking read runs on the runtime's blocking pool; the calling
    /// task suspends instead of stalling the scheduler.
    pub async fn get_async(&self, key: &str) -> Result<Option<Value>> {
        self.get_versioned_async(key, None).await
    }

    /// Async variant of [`get_versioned`](Self::get_versioned)
    pub async fn get_versioned_async(
        &self,
        key: &str,
        version: Option<&str>,
    ) -> Result<Option<Value>> {
        let store = self.clone();
        let key = key.to_string();
        let version = version.map(str::to_string);
        tokio::task::spawn_blocking(move || store.get_versioned(&key, version.as_deref()))
            .await
            .map_err(|e| CacheError::TaskJoin(e.to_string()))?
    }

    /// Async variant of [`set`](Self::set)
    pub async fn set_async(&self, key: &str, value: Value) -> Result<()> {
        self.set_versioned_async(key, value, None).await
    }

    /// Async variant of [`set_versioned`](Self::set_versioned)
    pub async fn set_versioned_async(
        &self,
        key: &str,
        value: Value,
        version: Option<&str>,
    ) -> Result<()> {
        let store = self.clone();
        let key = key.to_string();
        let version = version.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            store.set_versioned(&key, &value, version.as_deref())
        })
        .await
        .map_err(|e| CacheError::TaskJoin(e.to_string()))?
    }

    /// Async variant of [`delete`](Self::delete)
    pub async fn delete_async(&self, key: &str) -> Result<bool> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.delete(&key))
            .await
            .map_err(|e| CacheError::TaskJoin(e.to_string()))?
    }

    /// Async variant of [`clear`](Self::clear)
    pub async fn clear_async(&self) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.clear())
            .await
            .map_err(|e| CacheError::TaskJoin(e.to_string()))?
    }

    /// Async variant of [`contains`](Self::contains)
    pub async fn contains_async(&self, key: &str) -> bool {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.contains(&key))
            .await
            .unwrap_or(false)
    }
}
