//! Preview command - fetch the link preview for a URL.

use anyhow::{Context, Result};

use crate::config::ConfigFile;

pub async fn run(config: &ConfigFile, url: &str) -> Result<()> {
    let compiler = config.compiler()?;

    let preview = compiler
        .resolver()
        .preview_link(url)
        .await
        .with_context(|| format!("Failed to preview {url}"))?;

    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn previews_data_url() {
        let url = "data:text/html,<meta property=\"og:title\" content=\"Inline\">";

        assert!(run(&ConfigFile::default(), url).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_unsupported_scheme() {
        assert!(run(&ConfigFile::default(), "ftp://example.com").await.is_err());
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        assert!(run(&ConfigFile::default(), "not a url").await.is_err());
    }
}
