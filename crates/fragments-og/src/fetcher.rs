//! HTTP and `data:` retrieval of link previews.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::data::OpenGraphData;
use crate::extract::extract_open_graph;

/// Default user agent sent with every preview request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; LinkPreviewBot/1.0)";

/// Anything that can turn a URL into Open Graph data.
///
/// Implementations never fail: a page that cannot be read yields empty data.
#[async_trait]
pub trait PreviewSource: Send + Sync {
    async fn fetch(&self, url: &str) -> OpenGraphData;
}

/// Timeouts and identity for outgoing preview requests.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Connect and response-headers timeout
    pub timeout: Duration,
    /// Body read timeout, applied after headers arrive
    pub read_timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(4000),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
        }
    }
}

/// Reasons a page could not be read.
///
/// Only surfaced by [`OpenGraphFetcher::fetch_html`]; `fetch` logs these and
/// returns empty data.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Malformed data URL")]
    InvalidDataUrl,

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with {status}")]
    Status { status: u16 },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Response body not read within {0:?}")]
    ReadTimeout(Duration),
}

/// Open Graph fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct OpenGraphFetcher {
    client: Client,
    config: FetcherConfig,
}

impl OpenGraphFetcher {
    /// Create a fetcher with default timeouts.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a fetcher with custom timeouts and user agent.
    pub fn with_config(config: FetcherConfig) -> Result<Self, FetchError> {
        // No cookie store is configured, so no credentials leave the process.
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch `url` and extract its Open Graph data. Never fails.
    pub async fn fetch(&self, url: &str) -> OpenGraphData {
        match self.fetch_html(url).await {
            Ok(html) => {
                let data = extract_open_graph(&html, url);
                debug!("Extracted preview for {} (low value: {})", url, data.is_low_value());
                data
            }
            Err(e) => {
                warn!("Failed to fetch preview for {}: {}", url, e);
                OpenGraphData::default()
            }
        }
    }

    /// Retrieve the HTML behind `url`.
    ///
    /// `data:` URLs are decoded locally. Everything else must be http(s).
    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        if url.starts_with("data:") {
            return decode_data_url(url);
        }

        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let response = tokio::time::timeout(self.config.timeout, self.client.get(parsed).send())
            .await
            .map_err(|_| FetchError::Timeout(self.config.timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let html = tokio::time::timeout(self.config.read_timeout, response.text())
            .await
            .map_err(|_| FetchError::ReadTimeout(self.config.read_timeout))??;

        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(html)
    }
}

#[async_trait]
impl PreviewSource for OpenGraphFetcher {
    async fn fetch(&self, url: &str) -> OpenGraphData {
        OpenGraphFetcher::fetch(self, url).await
    }
}

/// Decode the payload of a `data:` URL as text.
pub fn decode_data_url(url: &str) -> Result<String, FetchError> {
    let rest = url.strip_prefix("data:").ok_or(FetchError::InvalidDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(FetchError::InvalidDataUrl)?;

    let bytes = if header.ends_with(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|_| FetchError::InvalidDataUrl)?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
