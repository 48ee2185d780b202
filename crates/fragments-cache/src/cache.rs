//! Read-through cache with stale-while-revalidate and single-flight production.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::entry::{CacheEntry, CachePolicy, Fresh, Freshness};
use crate::error::{BoxError, CacheError};
use crate::store::{CacheStore, MemoryStore};

type Flight = Shared<BoxFuture<'static, Result<Value, CacheError>>>;

/// Shared handle to a cache. Clones share the store and in-flight state.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    in_flight: Mutex<HashMap<String, Flight>>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("in_flight", &self.inner.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Create a cache over `store`.
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self::with_store(Arc::new(store))
    }

    /// Create a cache over a shared store handle.
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a cache backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.inner.store
    }

    /// Return the cached value for `key`, producing it when needed.
    ///
    /// - fresh entry: returned, `producer` is not called
    /// - stale entry: returned immediately, one background refresh is started
    /// - missing or expired: `producer` runs once however many callers wait
    ///   on the key, and its result is stored under `policy`
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        producer: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Fresh<T>, BoxError>> + Send + 'static,
    {
        let mut seen = None;
        if let Some(entry) = self.inner.store.get(key).await? {
            seen = Some(entry.created_at);
            match entry.freshness_at(Utc::now()) {
                Freshness::Fresh => match decode::<T>(key, entry.value) {
                    Ok(value) => {
                        tracing::debug!("cache hit: {}", key);
                        return Ok(value);
                    }
                    Err(e) => tracing::warn!("Discarding cache entry: {}", e),
                },
                Freshness::Stale => match decode::<T>(key, entry.value) {
                    Ok(value) => {
                        tracing::debug!("cache stale, refreshing in background: {}", key);
                        self.refresh_in_background(key, policy, seen, producer);
                        return Ok(value);
                    }
                    Err(e) => tracing::warn!("Discarding cache entry: {}", e),
                },
                Freshness::Expired => tracing::debug!("cache expired: {}", key),
            }
        } else {
            tracing::debug!("cache miss: {}", key);
        }

        let (flight, _) = self.join_flight(key, policy, seen, producer);
        let value = flight.await?;
        decode(key, value)
    }

    /// Remove the entry for `key`. Absent keys are a no-op.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        tracing::debug!("cache delete: {}", key);
        self.inner.store.delete(key).await
    }

    /// Inspect the entry for `key` without producing or refreshing.
    pub async fn peek(&self, key: &str) -> Result<Option<(CacheEntry, Freshness)>, CacheError> {
        Ok(self.inner.store.get(key).await?.map(|entry| {
            let freshness = entry.freshness_at(Utc::now());
            (entry, freshness)
        }))
    }

    /// Whether a production for `key` is currently running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner.in_flight.lock().contains_key(key)
    }

    fn refresh_in_background<T, F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        seen: Option<DateTime<Utc>>,
        producer: F,
    ) where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Fresh<T>, BoxError>> + Send + 'static,
    {
        let (flight, started) = self.join_flight(key, policy, seen, producer);
        if !started {
            return;
        }

        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = flight.await {
                tracing::warn!("Background refresh of {} failed: {}", key, e);
            }
        });
    }

    /// Join the running flight for `key`, or start one with `producer`.
    ///
    /// `seen` is the `created_at` of the entry the caller read, if any.
    /// Returns the flight and whether this call started it.
    fn join_flight<T, F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        seen: Option<DateTime<Utc>>,
        producer: F,
    ) -> (Flight, bool)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Fresh<T>, BoxError>> + Send + 'static,
    {
        let mut in_flight = self.inner.in_flight.lock();
        if let Some(existing) = in_flight.get(key) {
            tracing::debug!("joining in-flight production: {}", key);
            return (existing.clone(), false);
        }

        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();
        let flight = async move {
            let result = produce(&inner, &owned_key, policy, seen, producer).await;
            inner.in_flight.lock().remove(&owned_key);
            result
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), flight.clone());
        (flight, true)
    }
}

async fn produce<T, F, Fut>(
    inner: &Inner,
    key: &str,
    policy: CachePolicy,
    seen: Option<DateTime<Utc>>,
    producer: F,
) -> Result<Value, CacheError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fresh<T>, BoxError>>,
{
    // A flight that finished between the caller's read and this one may
    // already have stored a fresh entry.
    if let Some(entry) = inner.store.get(key).await? {
        let written_since = seen.map_or(true, |at| entry.created_at != at);
        if written_since && entry.freshness_at(Utc::now()) == Freshness::Fresh {
            tracing::debug!("reusing entry produced concurrently: {}", key);
            return Ok(entry.value);
        }
    }

    let fresh = producer().await.map_err(|source| CacheError::Producer {
        key: key.to_string(),
        source: Arc::from(source),
    })?;

    let value = serde_json::to_value(&fresh.value).map_err(|e| CacheError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;

    if fresh.cache && !policy.ttl.is_zero() {
        inner
            .store
            .set(CacheEntry::new(key, value.clone(), policy))
            .await?;
    } else {
        tracing::debug!("not caching low-value result: {}", key);
    }

    Ok(value)
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, CacheError> {
    serde_json::from_value(value).map_err(|e| CacheError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}
