//! Cache invalidation after a post is edited or deleted.

use fragments_cache::Cache;
use fragments_mdx::scan_directives;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::compiler::bundle_cache_key;
use crate::resolver::preview_cache_key;

/// Content and titles before and after a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub old_title: Option<String>,
    pub new_title: Option<String>,
}

/// URLs of every `preview` directive in `markdown`, deduplicated in
/// first-seen order.
///
/// Scans the raw text, so directives inside code or never compiled are
/// included too. URLs are read with the same accessor the resolver uses.
pub fn extract_preview_urls(markdown: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for found in scan_directives(markdown) {
        if found.name != "preview" {
            continue;
        }
        let directive = found.into_node(markdown);
        if let Some(url) = directive.attribute_or_shorthand("url") {
            if !urls.iter().any(|seen| seen == url) {
                urls.push(url.to_string());
            }
        }
    }
    urls
}

/// Cache keys an invalidation evicts: every preview URL in old and new
/// content, then the old compiled bundle.
pub fn invalidation_keys(invalidation: &Invalidation) -> Vec<String> {
    let mut urls = Vec::new();
    for content in [&invalidation.old_content, &invalidation.new_content]
        .into_iter()
        .flatten()
    {
        for url in extract_preview_urls(content) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }

    let mut keys: Vec<String> = urls.iter().map(|url| preview_cache_key(url)).collect();
    if let Some(old) = invalidation.old_content.as_deref().filter(|c| !c.is_empty()) {
        keys.push(bundle_cache_key(old, invalidation.old_title.as_deref()));
    }
    keys
}

/// Evict everything `invalidation` makes stale.
///
/// Deletions run concurrently and are best-effort: failures are logged and
/// never returned. Returns the keys that were attempted.
pub async fn invalidate(cache: &Cache, invalidation: &Invalidation) -> Vec<String> {
    let keys = invalidation_keys(invalidation);

    let results = join_all(keys.iter().map(|key| async move { (key, cache.delete(key).await) })).await;
    for (key, result) in results {
        match result {
            Ok(()) => debug!("Invalidated {}", key),
            Err(e) => warn!("Failed to invalidate {}: {}", key, e),
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{BundleCompiler, CompileOptions};
    use crate::resolver::DirectiveResolver;
    use async_trait::async_trait;
    use fragments_cache::{CacheEntry, CacheError, CachePolicy, CacheStore, MemoryStore};
    use fragments_og::{OpenGraphData, PreviewSource};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn policy() -> CachePolicy {
        CachePolicy::new(Duration::from_secs(60), Duration::from_secs(60))
    }

    async fn seed(store: &MemoryStore, keys: &[&str]) {
        for key in keys {
            store.set(CacheEntry::new(*key, json!(true), policy())).await.unwrap();
        }
    }

    /// Store whose deletes always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl CacheStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Ok(None)
        }

        async fn set(&self, _entry: CacheEntry) -> Result<(), CacheError> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::store("read-only"))
        }
    }

    #[test]
    fn extracts_urls_in_all_forms() {
        let markdown = r#"
:preview{url="https://a.com"}

Inline :preview{#https://b.com} and ::preview{#=https://c.com}.

:preview{url='https://a.com'} :youtube{#abc}

:preview{title="no url"}
"#;

        assert_eq!(
            extract_preview_urls(markdown),
            vec!["https://a.com", "https://b.com", "https://c.com"]
        );
    }

    #[test]
    fn empty_content_has_no_urls() {
        assert!(extract_preview_urls("").is_empty());
    }

    #[tokio::test]
    async fn evicts_old_and_new_previews_and_old_bundle_only() {
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::with_store(store.clone());
        let old = r#":preview{url="https://a.com"}"#;
        let new = r#":preview{url="https://b.com"}"#;
        let old_bundle = bundle_cache_key(old, None);
        let new_bundle = bundle_cache_key(new, None);
        seed(
            &store,
            &[
                "link-preview:https://a.com",
                "link-preview:https://b.com",
                "link-preview:https://unrelated.com",
                &old_bundle,
                &new_bundle,
            ],
        )
        .await;

        let attempted = invalidate(
            &cache,
            &Invalidation {
                old_content: Some(old.to_string()),
                new_content: Some(new.to_string()),
                ..Default::default()
            },
        )
        .await;

        assert_eq!(
            attempted,
            vec![
                "link-preview:https://a.com".to_string(),
                "link-preview:https://b.com".to_string(),
                old_bundle,
            ]
        );
        let mut expected = vec!["link-preview:https://unrelated.com".to_string(), new_bundle];
        expected.sort();
        assert_eq!(store.keys(), expected);
    }

    #[tokio::test]
    async fn old_title_selects_the_bundle_key() {
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::with_store(store.clone());
        let titled = bundle_cache_key("body", Some("Old"));
        let untitled = bundle_cache_key("body", None);
        seed(&store, &[&titled, &untitled]).await;

        invalidate(
            &cache,
            &Invalidation {
                old_content: Some("body".to_string()),
                old_title: Some("Old".to_string()),
                new_title: Some("New".to_string()),
                ..Default::default()
            },
        )
        .await;

        assert_eq!(store.keys(), vec![untitled]);
    }

    #[tokio::test]
    async fn shared_urls_are_deleted_once() {
        let keys = invalidation_keys(&Invalidation {
            old_content: Some(":preview{#https://a.com}".to_string()),
            new_content: Some(":preview{#https://a.com}".to_string()),
            ..Default::default()
        });

        assert_eq!(keys.iter().filter(|k| k.starts_with("link-preview:")).count(), 1);
    }

    #[tokio::test]
    async fn failed_deletes_do_not_fail_invalidation() {
        let cache = Cache::new(ReadOnlyStore);

        let attempted = invalidate(
            &cache,
            &Invalidation {
                old_content: Some(":preview{#https://a.com}".to_string()),
                ..Default::default()
            },
        )
        .await;

        assert_eq!(attempted.len(), 2);
    }

    struct TitledPreviews;

    #[async_trait]
    impl PreviewSource for TitledPreviews {
        async fn fetch(&self, url: &str) -> OpenGraphData {
            OpenGraphData {
                title: Some(format!("Page at {url}")),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn evicts_the_preview_keys_compilation_stored() {
        let sources = [
            ":preview{url=https://a.com/a*b*c}",
            r#":preview{url="https://a.com/?x=1&amp;y=2"}"#,
            r#":preview{url=" https://a.com"}"#,
            "Read *this* :preview{#https://a.com/x_y_z} and _that_ :preview{#https://b.com/_x_}",
        ];

        for source in sources {
            let store = Arc::new(MemoryStore::new());
            let cache = Cache::with_store(store.clone());
            let compiler =
                BundleCompiler::new(DirectiveResolver::new(cache, Arc::new(TitledPreviews)));
            compiler.compile(source, &CompileOptions::default()).await.unwrap();

            let stored: Vec<String> = store
                .keys()
                .into_iter()
                .filter(|key| key.starts_with("link-preview:"))
                .collect();
            let mut evicted: Vec<String> = invalidation_keys(&Invalidation {
                old_content: Some(source.to_string()),
                ..Default::default()
            })
            .into_iter()
            .filter(|key| key.starts_with("link-preview:"))
            .collect();
            evicted.sort();

            assert!(!stored.is_empty(), "nothing cached for {source}");
            assert_eq!(stored, evicted, "{source}");
        }
    }

    #[tokio::test]
    async fn nothing_to_do_without_content() {
        let cache = Cache::in_memory();

        assert!(invalidate(&cache, &Invalidation::default()).await.is_empty());
    }
}
