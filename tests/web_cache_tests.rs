//! Integration tests for the blob cache
//!
//! These tests verify the end-to-end blob cache behavior: freshness by
//! modification time, immediate reclamation of stale entries, the
//! whole-store flush at the size cap and the async surface.

use std::time::Duration;

use tiercache::web::{WebCache, WebCacheConfig};

fn cache_in(root: &std::path::Path) -> WebCache {
    WebCache::new(
        WebCacheConfig::builder()
            .app_name("integration")
            .root(root)
            .build(),
    )
}

#[test]
fn test_store_then_fetch_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());

    cache.store("u", b"x").unwrap();
    assert_eq!(
        cache.fetch("u", Duration::from_secs(3600)),
        Some(b"x".to_vec())
    );
}

#[test]
fn test_stale_entry_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());

    cache.store("u", b"x").unwrap();
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(cache.fetch("u", Duration::from_millis(1)), None);
    assert!(cache.find("u").is_none());
}

#[test]
fn test_size_cap_evicts_everything() {
    let dir = tempfile::tempdir().unwrap();
    let cache = WebCache::new(
        WebCacheConfig::builder()
            .app_name("integration")
            .max_cache_size(16)
            .root(dir.path())
            .build(),
    );

    cache.store("keep-me", b"01234567").unwrap();
    cache.store("filler", b"89abcdef").unwrap();
    assert!(cache.fetch("keep-me", Duration::from_secs(60)).is_some());

    // Still fresh, but the next store crosses the cap and flushes the store
    cache.store("overflow", b"!").unwrap();
    assert_eq!(cache.fetch("keep-me", Duration::from_secs(60)), None);
    assert_eq!(
        cache.fetch("overflow", Duration::from_secs(60)),
        Some(b"!".to_vec())
    );
}

#[test]
fn test_namespace_switch_runs_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());

    cache.store("a", b"data").unwrap();
    cache.set_app_name("fresh-namespace").unwrap();

    assert!(cache.cache_dir().ends_with("fresh-namespace"));
    assert!(cache.find("a").is_none());
}

#[tokio::test]
async fn test_async_surface() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());

    cache.store_async("key", b"payload".to_vec()).await.unwrap();
    assert_eq!(
        cache.fetch_async("key", Duration::from_secs(3600)).await,
        Some(b"payload".to_vec())
    );
    assert!(cache.find_async("key").await.is_some());

    cache.flush_async().await;
    assert_eq!(
        cache.fetch_async("key", Duration::from_secs(3600)).await,
        None
    );
}
