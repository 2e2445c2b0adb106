//! Blob cache for temporary storage of fetched remote content
//!
//! A disk-backed store of raw byte blobs keyed by an arbitrary identifier
//! (typically a URL). There is no envelope: freshness is judged purely by
//! file modification time against the age limit each caller supplies.
//! Space is bounded coarsely: once the running total reaches the configured
//! cap the whole store is flushed. The store root is namespaced by an
//! application name which can be changed at runtime.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

/// Configuration for a blob cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebCacheConfig {
    /// Application namespace; the last segment of the store root
    pub app_name: String,

    /// Total-size cap in bytes; reaching it flushes the whole store
    pub max_cache_size: u64,

    /// Age past which cleanup removes a file regardless of per-call limits
    pub max_general_age: Duration,

    /// Base directory holding the per-application stores; the system temp
    /// directory when unset
    pub root: Option<PathBuf>,
}

impl Default for WebCacheConfig {
    fn default() -> Self {
        Self {
            app_name: "shared".to_string(),
            // 200 MB
            max_cache_size: 200_000_000,
            // 7 hours
            max_general_age: Duration::from_secs(60 * 60 * 7),
            root: None,
        }
    }
}

impl WebCacheConfig {
    /// Create a new builder for blob cache configuration
    pub fn builder() -> WebCacheConfigBuilder {
        WebCacheConfigBuilder::default()
    }
}

/// Builder for blob cache configuration
#[derive(Debug, Default)]
pub struct WebCacheConfigBuilder {
    app_name: Option<String>,
    max_cache_size: Option<u64>,
    max_general_age: Option<Duration>,
    root: Option<PathBuf>,
}

impl WebCacheConfigBuilder {
    /// Set the application namespace
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the total-size cap in bytes
    pub fn max_cache_size(mut self, size: u64) -> Self {
        self.max_cache_size = Some(size);
        self
    }

    /// Set the general age limit applied by cleanup
    pub fn max_general_age(mut self, age: Duration) -> Self {
        self.max_general_age = Some(age);
        self
    }

    /// Set the base directory holding the per-application stores
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Build the blob cache configuration
    pub fn build(self) -> WebCacheConfig {
        let defaults = WebCacheConfig::default();
        WebCacheConfig {
            app_name: self.app_name.unwrap_or(defaults.app_name),
            max_cache_size: self.max_cache_size.unwrap_or(defaults.max_cache_size),
            max_general_age: self.max_general_age.unwrap_or(defaults.max_general_age),
            root: self.root,
        }
    }
}

struct WebState {
    cache_dir: PathBuf,
    max_cache_size: u64,
    max_general_age: Duration,
    total_size: u64,
    files_stored: u64,
    cleaned: bool,
}

/// Size- and age-bounded disk cache for opaque byte blobs
///
/// Cloning is cheap; clones share the same store state.
#[derive(Clone)]
pub struct WebCache {
    state: Arc<Mutex<WebState>>,
    root: PathBuf,
}

impl WebCache {
    /// Create a blob cache from a configuration
    pub fn new(config: WebCacheConfig) -> Self {
        let root = config
            .root
            .unwrap_or_else(|| std::env::temp_dir().join("tiercache"));
        let cache_dir = root.join(&config.app_name);
        Self {
            state: Arc::new(Mutex::new(WebState {
                cache_dir,
                max_cache_size: config.max_cache_size,
                max_general_age: config.max_general_age,
                total_size: 0,
                files_stored: 0,
                cleaned: false,
            })),
            root,
        }
    }

    /// Change the application namespace and immediately clean the new store
    pub fn set_app_name(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.cache_dir = self.root.join(name);
        let dir = state.cache_dir.clone();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        info!(dir = %dir.display(), "blob cache re-rooted");
        Self::cleanup_locked(&mut state);
        Ok(())
    }

    /// The store's current directory
    pub fn cache_dir(&self) -> PathBuf {
        self.state().cache_dir.clone()
    }

    /// Running total of stored bytes
    pub fn total_size(&self) -> u64 {
        self.state().total_size
    }

    /// Number of blobs stored through this instance
    pub fn files_stored(&self) -> u64 {
        self.state().files_stored
    }

    /// Deterministic filename for an identifier
    pub fn encoded_name(identifier: &str) -> String {
        hex::encode(Sha256::digest(identifier.as_bytes()))
    }

    fn state(&self) -> MutexGuard<'_, WebState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a blob under its identifier
    ///
    /// The first store of a run triggers a cleanup pass; reaching the size
    /// cap flushes the entire store before the new blob is written.
    pub fn store(&self, identifier: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.cleaned {
            Self::cleanup_locked(&mut state);
        }
        state.files_stored += 1;
        if state.files_stored == 1 {
            let dir = state.cache_dir.clone();
            fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        }
        if state.total_size >= state.max_cache_size {
            Self::flush_locked(&mut state);
        }
        let path = state.cache_dir.join(Self::encoded_name(identifier));
        fs::write(&path, data).map_err(|e| CacheError::io(&path, e))?;
        state.total_size += data.len() as u64;
        debug!(identifier, size = data.len(), "stored blob");
        Ok(())
    }

    /// Fetch a blob if it exists and is at most `max_age` old
    ///
    /// An over-age hit is deleted on the spot; staleness doubles as a
    /// reclamation signal.
    pub fn fetch(&self, identifier: &str, max_age: Duration) -> Option<Vec<u8>> {
        let mut state = self.state();
        let path = state.cache_dir.join(Self::encoded_name(identifier));
        if !path.exists() {
            return None;
        }
        match file_age(&path) {
            Some(age) if age <= max_age => match fs::read(&path) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(identifier, error = %e, "failed to read cached blob");
                    None
                }
            },
            _ => {
                Self::remove_outdated_locked(&mut state, &path);
                None
            }
        }
    }

    /// Resolve an identifier to its on-disk path, without any age check
    pub fn find(&self, identifier: &str) -> Option<PathBuf> {
        let state = self.state();
        let path = state.cache_dir.join(Self::encoded_name(identifier));
        path.exists().then_some(path)
    }

    /// Scan the store once: delete files past the general age limit and
    /// recompute the running size total
    pub fn cleanup(&self) {
        let mut state = self.state();
        Self::cleanup_locked(&mut state);
    }

    /// Remove every blob and reset the size counter
    pub fn flush(&self) {
        let mut state = self.state();
        Self::flush_locked(&mut state);
    }

    /// Async variant of [`store`](Self::store)
    pub async fn store_async(&self, identifier: &str, data: Vec<u8>) -> Result<()> {
        let cache = self.clone();
        let identifier = identifier.to_string();
        tokio::task::spawn_blocking(move || cache.store(&identifier, &data))
            .await
            .map_err(|e| CacheError::TaskJoin(e.to_string()))?
    }

    /// Async variant of [`fetch`](Self::fetch)
    pub async fn fetch_async(&self, identifier: &str, max_age: Duration) -> Option<Vec<u8>> {
        let cache = self.clone();
        let identifier = identifier.to_string();
        tokio::task::spawn_blocking(move || cache.fetch(&identifier, max_age))
            .await
            .unwrap_or(None)
    }

    /// Async variant of [`find`](Self::find)
    pub async fn find_async(&self, identifier: &str) -> Option<PathBuf> {
        let cache = self.clone();
        let identifier = identifier.to_string();
        tokio::task::spawn_blocking(move || cache.find(&identifier))
            .await
            .unwrap_or(None)
    }

    /// Async variant of [`cleanup`](Self::cleanup)
    pub async fn cleanup_async(&self) {
        let cache = self.clone();
        let _ = tokio::task::spawn_blocking(move || cache.cleanup()).await;
    }

    /// Async variant of [`flush`](Self::flush)
    pub async fn flush_async(&self) {
        let cache = self.clone();
        let _ = tokio::task::spawn_blocking(move || cache.flush()).await;
    }

    fn remove_outdated_locked(state: &mut WebState, path: &Path) {
        if let Ok(meta) = fs::metadata(path) {
            state.total_size = state.total_size.saturating_sub(meta.len());
        }
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove outdated blob");
        } else {
            debug!(path = %path.display(), "removed outdated blob");
        }
    }

    fn cleanup_locked(state: &mut WebState) {
        state.cleaned = true;
        let entries = match fs::read_dir(&state.cache_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let mut total = 0u64;
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            let age = file_age(&path).unwrap_or_default();
            if age > state.max_general_age {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove aged blob");
                    total += meta.len();
                } else {
                    removed += 1;
                }
            } else {
                total += meta.len();
            }
        }
        state.total_size = total;
        debug!(
            removed,
            total_size = state.total_size,
            "blob cache cleanup pass"
        );
        if state.total_size >= state.max_cache_size {
            Self::flush_locked(state);
        }
    }

    fn flush_locked(state: &mut WebState) {
        state.total_size = 0;
        match fs::remove_dir_all(&state.cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %state.cache_dir.display(), error = %e, "failed to flush blob cache"),
        }
        if let Err(e) = fs::create_dir_all(&state.cache_dir) {
            warn!(dir = %state.cache_dir.display(), error = %e, "failed to recreate blob cache dir");
        }
        info!(dir = %state.cache_dir.display(), "blob cache flushed");
    }
}

/// Age of a file as now minus last modification
fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use tempfile::tempdir;

    fn test_cache(root: &Path, max_cache_size: u64) -> WebCache {
        WebCache::new(
            WebCacheConfig::builder()
                .app_name("test")
                .max_cache_size(max_cache_size)
                .root(root)
                .build(),
        )
    }

    #[test]
    fn test_store_and_fetch() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store("https://example.com/a", b"payload").unwrap();
        assert_eq!(
            cache.fetch("https://example.com/a", Duration::from_secs(3600)),
            Some(b"payload".to_vec())
        );
    }

    #[test]
    fn test_fetch_missing() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);
        assert_eq!(cache.fetch("nope", Duration::from_secs(3600)), None);
    }

    #[test]
    fn test_expired_fetch_deletes_file() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store("u", b"x").unwrap();
        assert!(cache.find("u").is_some());

        sleep(Duration::from_millis(50));
        assert_eq!(cache.fetch("u", Duration::from_millis(1)), None);

        // Staleness reclaimed the file immediately
        assert!(cache.find("u").is_none());
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_find_ignores_age() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store("u", b"data").unwrap();
        sleep(Duration::from_millis(30));
        let path = cache.find("u").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_size_cap_flushes_whole_store() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 20);

        cache.store("one", b"0123456789").unwrap();
        cache.store("two", b"abcdefghij").unwrap();
        assert!(cache.fetch("one", Duration::from_secs(60)).is_some());

        // The cap is reached; the next store flushes everything first
        cache.store("three", b"x").unwrap();
        assert_eq!(cache.fetch("one", Duration::from_secs(60)), None);
        assert_eq!(cache.fetch("two", Duration::from_secs(60)), None);
        assert_eq!(
            cache.fetch("three", Duration::from_secs(60)),
            Some(b"x".to_vec())
        );
    }

    #[test]
    fn test_flush() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store("k1", b"data1").unwrap();
        cache.store("k2", b"data2").unwrap();
        cache.flush();

        assert_eq!(cache.fetch("k1", Duration::from_secs(3600)), None);
        assert_eq!(cache.fetch("k2", Duration::from_secs(3600)), None);
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_cleanup_keeps_fresh_files() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store("fresh", b"data").unwrap();
        cache.cleanup();

        assert_eq!(
            cache.fetch("fresh", Duration::from_secs(3600)),
            Some(b"data".to_vec())
        );
        assert_eq!(cache.total_size(), 4);
    }

    #[test]
    fn test_cleanup_removes_aged_files() {
        let dir = tempdir().unwrap();
        let cache = WebCache::new(
            WebCacheConfig::builder()
                .app_name("test")
                .max_general_age(Duration::from_millis(1))
                .root(dir.path())
                .build(),
        );

        cache.store("old", b"data").unwrap();
        sleep(Duration::from_millis(50));
        cache.cleanup();

        assert!(cache.find("old").is_none());
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_set_app_name_re_roots() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store("a", b"data").unwrap();
        cache.set_app_name("other").unwrap();
        assert!(cache.cache_dir().ends_with("other"));

        // The old namespace's blob is not visible in the new one
        assert!(cache.find("a").is_none());
    }

    #[test]
    fn test_encoded_name_is_hex() {
        let name = WebCache::encoded_name("https://example.com/x?y=1");
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_files_stored_counter() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store("a", b"1").unwrap();
        cache.store("b", b"2").unwrap();
        assert_eq!(cache.files_stored(), 2);
    }

    #[tokio::test]
    async fn test_async_store_and_fetch() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store_async("test_key", b"test_data".to_vec()).await.unwrap();
        assert_eq!(
            cache.fetch_async("test_key", Duration::from_secs(3600)).await,
            Some(b"test_data".to_vec())
        );
        assert_eq!(
            cache.fetch_async("missing", Duration::from_secs(3600)).await,
            None
        );
    }

    #[tokio::test]
    async fn test_async_flush_and_cleanup() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path(), 1_000_000);

        cache.store_async("key1", b"data1".to_vec()).await.unwrap();
        cache.store_async("key2", b"data2".to_vec()).await.unwrap();

        cache.cleanup_async().await;
        assert!(cache
            .fetch_async("key1", Duration::from_secs(3600))
            .await
            .is_some());

        cache.flush_async().await;
        assert_eq!(
            cache.fetch_async("key1", Duration::from_secs(3600)).await,
            None
        );
        assert_eq!(
            cache.fetch_async("key2", Duration::from_secs(3600)).await,
            None
        );
    }
}
