use recipe_portal::cache::{MemoryReadCache, ReadCache};
use std::time::Duration;

#[tokio::test]
async fn test_get_returns_value_until_ttl_elapses() {
    let cache = MemoryReadCache::new();
    cache
        .set_with_ttl("k", "v".to_string(), Duration::from_millis(200))
        .await
        .unwrap();

    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_key_is_none() {
    let cache = MemoryReadCache::new();
    assert_eq!(cache.get("never-set").await.unwrap(), None);
}

#[tokio::test]
async fn test_set_replaces_value_and_ttl() {
    let cache = MemoryReadCache::new();
    cache
        .set_with_ttl("k", "first".to_string(), Duration::from_millis(150))
        .await
        .unwrap();
    cache
        .set_with_ttl("k", "second".to_string(), Duration::from_secs(30))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("second"));
}

#[tokio::test]
async fn test_zero_ttl_drops_the_entry() {
    let cache = MemoryReadCache::new();
    cache
        .set_with_ttl("k", "v".to_string(), Duration::from_secs(30))
        .await
        .unwrap();
    cache
        .set_with_ttl("k", "v2".to_string(), Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_invalidate_removes_only_that_key() {
    let cache = MemoryReadCache::new();
    let ttl = Duration::from_secs(30);
    cache.set_with_ttl("a", "1".to_string(), ttl).await.unwrap();
    cache.set_with_ttl("b", "2".to_string(), ttl).await.unwrap();

    cache.invalidate("a").await.unwrap();
    // Invalidating an absent key is fine
    cache.invalidate("zzz").await.unwrap();

    assert_eq!(cache.get("a").await.unwrap(), None);
    assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
}

#[tokio::test]
async fn test_clones_share_entries() {
    let cache = MemoryReadCache::with_capacity(16);
    let other = cache.clone();
    cache
        .set_with_ttl("shared", "yes".to_string(), Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(other.get("shared").await.unwrap().as_deref(), Some("yes"));
}
