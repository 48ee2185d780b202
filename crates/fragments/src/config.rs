//! Configuration file (`fragments.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use fragments_bundle::{BundleCompiler, DirectiveResolver, JsonImageStore};
use fragments_cache::{Cache, FsStore};
use fragments_og::{FetcherConfig, OpenGraphFetcher, DEFAULT_USER_AGENT};

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub preview: PreviewSettings,
    #[serde(default)]
    pub images: ImageSettings,
    #[serde(default)]
    pub content: ContentSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Default)]
pub struct CacheSettings {
    /// Shared cache directory; in-memory when unset
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ImageSettings {
    /// JSON manifest of image records keyed by id
    pub manifest: Option<PathBuf>,
    /// Public base URL that storage keys are joined onto
    pub asset_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentSettings {
    #[serde(default = "default_content_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            dir: default_content_dir(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}
fn default_read_timeout_ms() -> u64 {
    4000
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}
fn default_concurrency() -> usize {
    2
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}

/// Load configuration from `path` if it exists.
/// Returns an error if the file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

impl ConfigFile {
    /// Cache backed by the configured directory, or memory.
    pub fn cache(&self) -> Cache {
        match &self.cache.dir {
            Some(dir) => Cache::new(FsStore::new(dir)),
            None => Cache::in_memory(),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_millis(self.preview.timeout_ms),
            read_timeout: Duration::from_millis(self.preview.read_timeout_ms),
            user_agent: self.preview.user_agent.clone(),
            ..Default::default()
        }
    }

    /// Wire the full compile pipeline from this configuration.
    pub fn compiler(&self) -> Result<BundleCompiler> {
        let fetcher = OpenGraphFetcher::with_config(self.fetcher_config())
            .context("Failed to build HTTP client")?;

        let mut resolver = DirectiveResolver::new(self.cache(), Arc::new(fetcher));
        if let Some(manifest) = &self.images.manifest {
            resolver = resolver.with_image_store(Arc::new(JsonImageStore::new(manifest)));
        }
        if let Some(base) = &self.images.asset_base_url {
            resolver = resolver.with_asset_base_url(base.as_str());
        }

        Ok(BundleCompiler::new(resolver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().unwrap();

        let config = load_config(&temp.path().join("fragments.toml")).unwrap();

        assert!(config.cache.dir.is_none());
        assert_eq!(config.preview.timeout_ms, 5000);
        assert_eq!(config.preview.read_timeout_ms, 4000);
        assert_eq!(config.preview.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.content.dir, PathBuf::from("content"));
        assert_eq!(config.content.concurrency, 2);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("fragments.toml");
        fs::write(
            &path,
            r#"
[cache]
dir = ".cache/fragments"

[preview]
timeout_ms = 1500

[images]
asset_base_url = "https://cdn.example.com"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();

        assert_eq!(config.cache.dir, Some(PathBuf::from(".cache/fragments")));
        assert_eq!(config.preview.timeout_ms, 1500);
        assert_eq!(config.preview.read_timeout_ms, 4000);
        assert_eq!(config.images.asset_base_url.as_deref(), Some("https://cdn.example.com"));
        assert_eq!(config.server.host, "127.0.0.1");

        let fetcher = config.fetcher_config();
        assert_eq!(fetcher.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("fragments.toml");
        fs::write(&path, "[preview\ntimeout_ms = ").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn builds_compiler_from_defaults() {
        assert!(ConfigFile::default().compiler().is_ok());
    }
}
