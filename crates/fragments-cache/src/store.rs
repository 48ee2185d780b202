//! Backing stores for cache entries.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::entry::{CacheEntry, Freshness};
use crate::error::CacheError;

/// Where cache entries live.
///
/// Implementations must write entries whole: a reader sees either no entry
/// or a complete one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the entry for `key`.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or overwrite an entry.
    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove the entry for `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local store.
///
/// Entries past `ttl + swr` are dropped when read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = Utc::now();
        let entry = self.entries.read().get(key).cloned();
        match entry {
            Some(entry) if entry.freshness_at(now) == Freshness::Expired => {
                let mut entries = self.entries.write();
                if entries
                    .get(key)
                    .is_some_and(|current| current.freshness_at(now) == Freshness::Expired)
                {
                    entries.remove(key);
                }
                Ok(None)
            }
            entry => Ok(entry),
        }
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Directory-backed store shared by every process pointed at the same path.
///
/// Each entry is one JSON file named after the SHA-256 of its key.
#[derive(Debug)]
pub struct FsStore {
    dir: PathBuf,
    writes: AtomicU64,
}

impl FsStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writes: AtomicU64::new(0),
        }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

#[async_trait]
impl CacheStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::store(format!("read {}: {}", path.display(), e))),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.key == key => Ok(Some(entry)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::store(format!("create {}: {}", self.dir.display(), e)))?;

        let path = self.path_for(&entry.key);
        let bytes = serde_json::to_vec(&entry).map_err(|e| CacheError::Encode {
            key: entry.key.clone(),
            message: e.to_string(),
        })?;

        // Write then rename so readers never observe a partial file.
        let sequence = self.writes.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{}", std::process::id(), sequence));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| CacheError::store(format!("write {}: {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                tracing::warn!("Failed to remove {}: {}", tmp.display(), cleanup);
            }
            return Err(CacheError::store(format!("rename {}: {}", path.display(), e)));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::store(format!("delete {}: {}", path.display(), e))),
        }
    }
}
