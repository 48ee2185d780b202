//! Invalidate command - evict caches made stale by a post edit.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use fragments_bundle::{invalidate, CompileOptions, Invalidation};

use crate::config::ConfigFile;

/// Arguments for the invalidate command.
#[derive(Debug, Default)]
pub struct InvalidateArgs {
    pub old: Option<PathBuf>,
    pub new: Option<PathBuf>,
    pub old_title: Option<String>,
    pub new_title: Option<String>,
    pub warm: bool,
}

pub async fn run(config: &ConfigFile, args: InvalidateArgs) -> Result<Vec<String>> {
    if args.old.is_none() && args.new.is_none() {
        bail!("Nothing to invalidate: pass --old and/or --new");
    }

    let invalidation = Invalidation {
        old_content: read_optional(args.old.as_deref())?,
        new_content: read_optional(args.new.as_deref())?,
        old_title: args.old_title,
        new_title: args.new_title,
    };

    let compiler = config.compiler()?;
    let keys = invalidate(compiler.cache(), &invalidation).await;
    for key in &keys {
        println!("{key}");
    }
    tracing::info!("Invalidated {} keys", keys.len());

    if args.warm {
        if let Some(content) = invalidation.new_content.filter(|c| !c.is_empty()) {
            let options = CompileOptions {
                title: invalidation.new_title,
            };
            compiler
                .warm_in_background(content, options)
                .await
                .context("Warm task panicked")?;
        }
    }

    Ok(keys)
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display())))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragments_bundle::bundle_cache_key;
    use tempfile::tempdir;

    #[tokio::test]
    async fn requires_some_content() {
        let result = run(&ConfigFile::default(), InvalidateArgs::default()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn evicts_preview_and_bundle_keys() {
        let temp = tempdir().unwrap();
        let old = temp.path().join("old.mdx");
        let old_source = ":preview{url=\"https://a.com\"}\n";
        fs::write(&old, old_source).unwrap();

        let keys = run(
            &ConfigFile::default(),
            InvalidateArgs {
                old: Some(old),
                old_title: Some("Post".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(
            keys,
            vec![
                "link-preview:https://a.com".to_string(),
                bundle_cache_key(old_source, Some("Post")),
            ]
        );
    }

    #[tokio::test]
    async fn warms_new_content_into_shared_cache() {
        let temp = tempdir().unwrap();
        let new = temp.path().join("new.mdx");
        fs::write(&new, "# Fresh\n").unwrap();
        let mut config = ConfigFile::default();
        config.cache.dir = Some(temp.path().join("cache"));

        run(
            &config,
            InvalidateArgs {
                new: Some(new),
                new_title: Some("Fresh".to_string()),
                warm: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let key = bundle_cache_key("# Fresh\n", Some("Fresh"));
        assert!(config.cache().peek(&key).await.unwrap().is_some());
    }
}
