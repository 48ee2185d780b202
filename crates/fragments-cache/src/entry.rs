//! Cache entries and their freshness lifecycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How long a produced value stays fresh, then servable while stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Time the value is fresh
    pub ttl: Duration,

    /// Extra time a stale value may be served while it is refreshed
    pub swr: Duration,
}

impl CachePolicy {
    /// Create a policy.
    pub const fn new(ttl: Duration, swr: Duration) -> Self {
        Self { ttl, swr }
    }
}

/// State of an entry at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within `ttl`
    Fresh,
    /// Past `ttl`, within `ttl + swr`
    Stale,
    /// Past `ttl + swr`, unservable
    Expired,
}

/// A fully populated cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key
    pub key: String,

    /// Encoded value
    pub value: Value,

    /// When the value was produced
    pub created_at: DateTime<Utc>,

    /// Fresh lifetime
    pub ttl: Duration,

    /// Stale-while-revalidate window after `ttl`
    pub swr: Duration,
}

impl CacheEntry {
    /// Create an entry produced now.
    pub fn new(key: impl Into<String>, value: Value, policy: CachePolicy) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            ttl: policy.ttl,
            swr: policy.swr,
        }
    }

    /// Freshness of the entry at `now`.
    ///
    /// A `created_at` in the future (clock skew between processes) counts as
    /// just created.
    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        let age = (now - self.created_at).to_std().unwrap_or(Duration::ZERO);

        if age < self.ttl {
            Freshness::Fresh
        } else if age < self.ttl.saturating_add(self.swr) {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

/// A produced value plus whether it may be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Fresh<T> {
    /// The value returned to callers
    pub value: T,

    /// Whether the value is written to the store
    pub cache: bool,
}

impl<T> Fresh<T> {
    /// A value to store under the request's policy.
    pub fn new(value: T) -> Self {
        Self { value, cache: true }
    }

    /// A low-value result: returned to the caller but expired immediately,
    /// so the next request produces again.
    pub fn uncached(value: T) -> Self {
        Self {
            value,
            cache: false,
        }
    }
}

impl<T> From<T> for Fresh<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
