//! Bundle compiler.
//!
//! Turns MDX source into an executable document module, cached by content
//! hash. Compiled bundles are effectively permanent per `(source, title)`;
//! the stale window only allows silent recompilation after a pipeline
//! change.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fragments_cache::{BoxError, Cache, CacheError, CachePolicy, Fresh};
use fragments_mdx::{parse_document, Frontmatter, ParseError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::generator::generate_module;
use crate::resolver::DirectiveResolver;

/// Bumped whenever generated output changes shape.
pub const PIPELINE_VERSION: &str = "v2";

const DAY: u64 = 24 * 60 * 60;

/// One year fresh, thirty days stale.
pub const BUNDLE_POLICY: CachePolicy =
    CachePolicy::new(Duration::from_secs(365 * DAY), Duration::from_secs(30 * DAY));

/// Title used in cache keys when none is given.
pub const UNTITLED: &str = "untitled";

/// Options for a single compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub title: Option<String>,
}

impl CompileOptions {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
        }
    }
}

/// Executable module plus the document's frontmatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledBundle {
    pub code: String,
    pub frontmatter: Frontmatter,
}

/// Errors that can occur while compiling.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Source is required")]
    EmptySource,

    #[error("Failed to parse MDX: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },
}

impl CompileError {
    /// The request itself was bad, as opposed to the cache or filesystem.
    pub fn is_caller_error(&self) -> bool {
        match self {
            Self::EmptySource | Self::Parse(_) => true,
            Self::Cache(e) => e.producer_error().is_some(),
            Self::Read { .. } => false,
        }
    }
}

/// Cache key for a compiled bundle.
///
/// Changing the title, one character of the source, or the pipeline version
/// all produce a different key.
pub fn bundle_cache_key(source: &str, title: Option<&str>) -> String {
    let digest = Sha256::digest(source.as_bytes());
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED);
    format!("mdx:bundle:{}:{}:{}", PIPELINE_VERSION, title, hex::encode(digest))
}

/// A document found on disk for prewarming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub source: String,
}

/// Outcome of a prewarm run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrewarmReport {
    /// Documents compiled (or already cached) successfully
    pub compiled: usize,

    /// Documents attempted
    pub total: usize,

    pub elapsed_ms: u64,
}

/// Compiles MDX sources through the cache.
#[derive(Debug, Clone)]
pub struct BundleCompiler {
    resolver: DirectiveResolver,
    compilations: Arc<AtomicUsize>,
}

impl BundleCompiler {
    pub fn new(resolver: DirectiveResolver) -> Self {
        Self {
            resolver,
            compilations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn resolver(&self) -> &DirectiveResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Cache {
        self.resolver.cache()
    }

    /// Number of times the full pipeline has run.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    /// Compile `source`, reusing a cached bundle for the same source and title.
    pub async fn compile(
        &self,
        source: &str,
        options: &CompileOptions,
    ) -> Result<CompiledBundle, CompileError> {
        if source.is_empty() {
            return Err(CompileError::EmptySource);
        }

        let key = bundle_cache_key(source, options.title.as_deref());
        let compiler = self.clone();
        let owned = source.to_string();

        let bundle = self
            .cache()
            .get_or_compute(&key, BUNDLE_POLICY, move || async move {
                let bundle = compiler.run_pipeline(&owned).await?;
                Ok::<_, BoxError>(Fresh::new(bundle))
            })
            .await?;

        Ok(bundle)
    }

    /// Parse, resolve and generate without touching the bundle cache.
    pub async fn run_pipeline(&self, source: &str) -> Result<CompiledBundle, CompileError> {
        self.compilations.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        let mut document = parse_document(source)?;
        let embeds = self.resolver.resolve(&mut document).await;
        let code = generate_module(&document);

        info!(
            "Compiled document ({} bytes, {} embeds) in {:?}",
            code.len(),
            embeds,
            started.elapsed()
        );

        Ok(CompiledBundle {
            code,
            frontmatter: document.frontmatter,
        })
    }

    /// Compile on a detached task. Failures are logged and never returned.
    pub fn warm_in_background(&self, source: String, options: CompileOptions) -> JoinHandle<()> {
        let compiler = self.clone();
        tokio::spawn(async move {
            match compiler.compile(&source, &options).await {
                Ok(_) => debug!("Warmed bundle for {:?}", options.title),
                Err(e) => warn!("Background compile failed: {}", e),
            }
        })
    }

    /// Compile every document with at most `concurrency` compiles in flight.
    ///
    /// Individual failures are logged and counted out of `compiled`.
    pub async fn prewarm(&self, documents: Vec<SourceDocument>, concurrency: usize) -> PrewarmReport {
        let started = Instant::now();
        let total = documents.len();

        let results: Vec<bool> = stream::iter(documents)
            .map(|document| async move {
                match self.compile(&document.source, &CompileOptions::default()).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Prewarm of {} failed: {}", document.path.display(), e);
                        false
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let report = PrewarmReport {
            compiled: results.into_iter().filter(|ok| *ok).count(),
            total,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Prewarmed {}/{} documents in {}ms",
            report.compiled, report.total, report.elapsed_ms
        );
        report
    }
}

/// Find `.md` and `.mdx` files under `dir`, sorted by path.
pub fn discover_sources(dir: &Path) -> Result<Vec<SourceDocument>, CompileError> {
    if !dir.is_dir() {
        return Err(CompileError::Read {
            path: dir.display().to_string(),
            message: "not a directory".to_string(),
        });
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != "mdx" && ext != "md" {
            continue;
        }

        let source = fs::read_to_string(path).map_err(|e| CompileError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        documents.push(SourceDocument {
            path: path.to_path_buf(),
            source,
        });
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}
