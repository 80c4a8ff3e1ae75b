//! Response caching for repeated evaluation runs.
//!
//! Remote rerank and completion calls are deterministic for a fixed
//! (query, parameters, model) triple, so re-running an evaluation should
//! not re-pay for them. The cache is keyed by a caller-derived string and
//! layered around operations with [`memoized`]; the batch harness itself
//! stays cache-agnostic.

use crate::error::Result;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// String-keyed cache for remote call results.
pub struct ResponseCache<T> {
    cache: Cache<String, Arc<T>>,
}

impl<T: Send + Sync + 'static> ResponseCache<T> {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<T>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, value: T) {
        self.cache.insert(key, Arc::new(value)).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Consult the cache under `key`, running `operation` only on a miss and
/// populating the cache with its result.
///
/// The key derivation stays with the caller, so any operation can be
/// memoized without the cache knowing the request's shape.
pub async fn memoized<T, Op, Fut>(
    cache: &ResponseCache<T>,
    key: String,
    operation: Op,
) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
    Op: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(hit) = cache.get(&key).await {
        return Ok(hit);
    }

    let value = operation().await?;
    let value = Arc::new(value);
    cache.cache.insert(key, Arc::clone(&value)).await;
    Ok(value)
}
