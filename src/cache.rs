//! Short-lived key/value cache for serialized read models.
//!
//! [`ReadCache`] is the narrow contract the recipe lifecycle consumes. The shipped
//! implementation, [`MemoryReadCache`], is an in-process [`moka`] cache whose entries
//! each carry the TTL they were written with.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use moka::{Expiry, future::Cache};
use tracing::trace;

use crate::error::CacheError;

/// Default upper bound on the number of cached entries.
const DEFAULT_MAX_ENTRIES: u64 = 1_000;

/// ReadCache
///
/// Values are opaque strings (serialized JSON); the cache never interprets them.
#[async_trait]
pub trait ReadCache: Send + Sync {
    /// Returns the value if present and not yet expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value`, replacing any previous entry, for `ttl`.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration)
    -> Result<(), CacheError>;

    /// Drops the entry if present.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

/// CacheState
///
/// The concrete type used to share the cache across the application state.
pub type CacheState = Arc<dyn ReadCache>;

#[derive(Clone)]
struct CachedValue {
    body: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was (re)written with.
struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// MemoryReadCache
///
/// In-process [`ReadCache`]. Clones share the same underlying cache.
#[derive(Clone)]
pub struct MemoryReadCache {
    cache: Cache<String, CachedValue>,
}

impl MemoryReadCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryReadCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadCache for MemoryReadCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let hit = self.cache.get(key).await.map(|v| v.body);
        trace!(key, hit = hit.is_some(), "read cache lookup");
        Ok(hit)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            self.cache.invalidate(key).await;
            return Ok(());
        }
        self.cache
            .insert(key.to_string(), CachedValue { body: value, ttl })
            .await;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
