//! Prewarm command - compile every post in a content directory.

use std::path::PathBuf;

use anyhow::{Context, Result};

use fragments_bundle::{discover_sources, PrewarmReport};

use crate::config::ConfigFile;

pub async fn run(
    config: &ConfigFile,
    dir: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<PrewarmReport> {
    let dir = dir.unwrap_or_else(|| config.content.dir.clone());
    let concurrency = concurrency.unwrap_or(config.content.concurrency);

    let documents = discover_sources(&dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    tracing::info!(
        "Prewarming {} documents from {} ({} at a time)",
        documents.len(),
        dir.display(),
        concurrency
    );

    let compiler = config.compiler()?;
    let report = compiler.prewarm(documents, concurrency).await;

    println!(
        "Compiled {}/{} documents in {}ms",
        report.compiled, report.total, report.elapsed_ms
    );
    Ok(report)
}
