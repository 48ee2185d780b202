//! Compile command - compile one MDX file into a bundle.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fragments_bundle::{bundle_cache_key, CompileOptions, CompiledBundle};
use fragments_cache::Freshness;

use crate::config::ConfigFile;

/// Compile `file` and print the bundle JSON, or write it to `output`.
pub async fn run(
    config: &ConfigFile,
    file: PathBuf,
    title: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let bundle = compile_file(config, &file, title).await?;
    let json = serde_json::to_string_pretty(&bundle)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote bundle to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

async fn compile_file(
    config: &ConfigFile,
    file: &Path,
    title: Option<String>,
) -> Result<CompiledBundle> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let compiler = config.compiler()?;

    let key = bundle_cache_key(&source, title.as_deref());
    match compiler.cache().peek(&key).await {
        Ok(Some((_, Freshness::Fresh))) => tracing::info!("Cache hit for {}", file.display()),
        Ok(Some((_, Freshness::Stale))) => {
            tracing::info!("Cached bundle is stale, refreshing {}", file.display())
        }
        Ok(_) => tracing::info!("Compiling {}", file.display()),
        Err(e) => tracing::warn!("Failed to inspect cache: {}", e),
    }

    let options = CompileOptions { title };
    let bundle = compiler
        .compile(&source, &options)
        .await
        .with_context(|| format!("Failed to compile {}", file.display()))?;

    Ok(bundle)
}
