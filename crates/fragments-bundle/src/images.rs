//! Image metadata lookup.
//!
//! Post images are referenced by an opaque id embedded in their URL. The
//! resolver asks an [`ImageStore`] for stored dimensions and the object
//! storage key of that id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fragments_cache::BoxError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Stored metadata for one uploaded image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,

    /// Object storage key, joined onto the public asset base URL
    #[serde(default, alias = "s3Key")]
    pub storage_key: Option<String>,
}

impl ImageRecord {
    /// Width and height, when both are known and non-zero.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

/// Width/height-by-id lookup.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Look up an image by id. `Ok(None)` when the id is unknown.
    async fn lookup(&self, id: &str) -> Result<Option<ImageRecord>, BoxError>;
}

/// In-process image store.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    records: RwLock<HashMap<String, ImageRecord>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record.
    pub fn insert(&self, id: impl Into<String>, record: ImageRecord) {
        self.records.write().insert(id.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl FromIterator<(String, ImageRecord)> for MemoryImageStore {
    fn from_iter<I: IntoIterator<Item = (String, ImageRecord)>>(iter: I) -> Self {
        Self {
            records: RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn lookup(&self, id: &str) -> Result<Option<ImageRecord>, BoxError> {
        Ok(self.records.read().get(id).cloned())
    }
}

/// Image store backed by a JSON manifest: `{"<id>": {"width": .., "height": .., "storage_key": ..}}`.
///
/// The manifest is re-read on every lookup so uploads show up without a
/// restart.
#[derive(Debug, Clone)]
pub struct JsonImageStore {
    path: PathBuf,
}

impl JsonImageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, ImageRecord>, BoxError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ImageStore for JsonImageStore {
    async fn lookup(&self, id: &str) -> Result<Option<ImageRecord>, BoxError> {
        let mut records = self.load().await?;
        Ok(records.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dimensions_require_both_values() {
        let full = ImageRecord {
            width: Some(800),
            height: Some(600),
            storage_key: None,
        };
        let partial = ImageRecord {
            width: Some(800),
            ..Default::default()
        };

        assert_eq!(full.dimensions(), Some((800, 600)));
        assert_eq!(partial.dimensions(), None);
    }

    #[tokio::test]
    async fn memory_store_lookup() {
        let store: MemoryImageStore = [(
            "abc".to_string(),
            ImageRecord {
                width: Some(10),
                height: Some(20),
                storage_key: Some("post-images/abc.webp".to_string()),
            },
        )]
        .into_iter()
        .collect();

        let found = store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(found.storage_key.as_deref(), Some("post-images/abc.webp"));
        assert!(store.lookup("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_store_reads_manifest() {
        let temp = tempdir().unwrap();
        let manifest = temp.path().join("images.json");
        std::fs::write(
            &manifest,
            r#"{"abc": {"width": 1200, "height": 630, "s3Key": "post-images/abc.png"}}"#,
        )
        .unwrap();

        let store = JsonImageStore::new(&manifest);
        let record = store.lookup("abc").await.unwrap().unwrap();

        assert_eq!(record.dimensions(), Some((1200, 630)));
        assert_eq!(record.storage_key.as_deref(), Some("post-images/abc.png"));
        assert!(store.lookup("xyz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_store_missing_manifest_is_an_error() {
        let temp = tempdir().unwrap();
        let store = JsonImageStore::new(temp.path().join("nope.json"));

        assert!(store.lookup("abc").await.is_err());
    }
}
