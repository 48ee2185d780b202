//! Directive and image resolution.
//!
//! Walks a parsed document and replaces every recognised node with an
//! [`EmbedNode`]. Enrichment (link previews, image metadata) runs
//! concurrently; each result is written back at the node's own path so
//! sibling order never depends on completion order.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use fragments_cache::{BoxError, Cache, CacheError, CachePolicy, Fresh};
use fragments_mdx::{Component, DirectiveNode, Document, EmbedNode, ImageNode, Node, NodePath};
use fragments_og::{OpenGraphData, PreviewSource};
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::images::ImageStore;

const HOUR: u64 = 60 * 60;

/// Previews embedded in compiled documents.
pub const EMBED_PREVIEW_POLICY: CachePolicy =
    CachePolicy::new(Duration::from_secs(24 * HOUR), Duration::from_secs(7 * 24 * HOUR));

/// Previews served directly to clients.
pub const LINK_PREVIEW_POLICY: CachePolicy =
    CachePolicy::new(Duration::from_secs(10 * 60), Duration::from_secs(24 * HOUR));

/// Styling applied to every resolved image.
pub const IMAGE_CLASS_NAME: &str = "rounded-md max-w-full";

/// Domain reported for `data:` previews.
pub const DATA_URL_DOMAIN: &str = "data-url";

static POST_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/resources/post-images/(\w+)").expect("Invalid post image regex")
});

/// Cache key for the Open Graph data of `url`.
pub fn preview_cache_key(url: &str) -> String {
    format!("link-preview:{}", url)
}

/// Errors surfaced by [`DirectiveResolver::preview_link`].
///
/// Document resolution itself never fails; these are logged and degraded.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Preview payload for a single link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    #[serde(flatten)]
    pub data: OpenGraphData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    pub url: String,
}

/// Rewrites directives and images into embeds.
#[derive(Clone)]
pub struct DirectiveResolver {
    cache: Cache,
    previews: Arc<dyn PreviewSource>,
    images: Option<Arc<dyn ImageStore>>,
    asset_base_url: Option<String>,
}

impl std::fmt::Debug for DirectiveResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveResolver")
            .field("cache", &self.cache)
            .field("images", &self.images.is_some())
            .field("asset_base_url", &self.asset_base_url)
            .finish_non_exhaustive()
    }
}

/// Pending work for one node.
enum Target {
    Directive(DirectiveNode),
    Image(ImageNode),
}

impl DirectiveResolver {
    pub fn new(cache: Cache, previews: Arc<dyn PreviewSource>) -> Self {
        Self {
            cache,
            previews,
            images: None,
            asset_base_url: None,
        }
    }

    /// Enable width/height lookup for post images.
    pub fn with_image_store(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.images = Some(images);
        self
    }

    /// Rewrite post image sources to `{base}/{storage_key}`.
    pub fn with_asset_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        let trimmed = base.trim().trim_end_matches('/');
        self.asset_base_url = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Resolve every directive and image in `document`.
    ///
    /// Returns once all enrichment has settled. Unknown directives and
    /// directives missing their required attribute are left in place.
    /// Returns the number of nodes replaced.
    pub async fn resolve(&self, document: &mut Document) -> usize {
        let mut targets: Vec<(NodePath, Target)> = Vec::new();
        document.visit(|path, node| match node {
            Node::Directive(directive) => {
                targets.push((path.to_vec(), Target::Directive(directive.clone())))
            }
            Node::Image(image) => targets.push((path.to_vec(), Target::Image(image.clone()))),
            _ => {}
        });

        let resolved = join_all(targets.into_iter().map(|(path, target)| async move {
            let embed = match target {
                Target::Directive(directive) => self.resolve_directive(&directive).await,
                Target::Image(image) => Some(self.resolve_image(&image).await),
            };
            (path, embed)
        }))
        .await;

        let mut replaced = 0;
        for (path, embed) in resolved {
            if let Some(embed) = embed {
                if document.replace(&path, Node::Embed(embed)).is_some() {
                    replaced += 1;
                }
            }
        }
        replaced
    }

    async fn resolve_directive(&self, directive: &DirectiveNode) -> Option<EmbedNode> {
        match directive.name.as_str() {
            "youtube" => {
                let Some(id) = directive.attribute_or_shorthand("id") else {
                    debug!("Leaving youtube directive without id unresolved");
                    return None;
                };
                Some(EmbedNode::new(Component::YouTube).with("id", id))
            }
            "preview" => {
                let Some(url) = directive.attribute_or_shorthand("url") else {
                    debug!("Leaving preview directive without url unresolved");
                    return None;
                };
                Some(self.resolve_preview(url, directive).await)
            }
            _ => None,
        }
    }

    async fn resolve_preview(&self, url: &str, directive: &DirectiveNode) -> EmbedNode {
        match self.preview_embed(url, directive).await {
            Ok(embed) => embed,
            Err(e) => {
                warn!("Falling back to bare preview for {}: {}", url, e);
                EmbedNode::new(Component::LinkPreview).with("url", url)
            }
        }
    }

    async fn preview_embed(
        &self,
        url: &str,
        directive: &DirectiveNode,
    ) -> Result<EmbedNode, ResolveError> {
        let domain = preview_domain(url)?;
        let og = self.open_graph(url, EMBED_PREVIEW_POLICY).await?;

        // Author-supplied attributes win over fetched values.
        let pick = |name: &str, fetched: Option<String>| {
            directive
                .attribute(name)
                .map(str::to_string)
                .or(fetched)
                .filter(|value| !value.is_empty())
        };

        let mut embed = EmbedNode::new(Component::LinkPreview).with("url", url);
        let fields = [
            ("title", pick("title", og.title)),
            ("description", pick("description", og.description)),
            ("image", pick("image", og.image)),
            ("domain", pick("domain", domain)),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                embed.push(name, value);
            }
        }
        Ok(embed)
    }

    async fn resolve_image(&self, image: &ImageNode) -> EmbedNode {
        let mut embed = EmbedNode::new(Component::Image)
            .with("src", image.url.as_str())
            .with("alt", image.alt.as_str());
        if let Some(title) = image.title.as_deref().filter(|t| !t.is_empty()) {
            embed.push("title", title);
        }

        if let Some(id) = post_image_id(&image.url) {
            self.enrich_image(id, &mut embed).await;
        }

        embed.push("className", IMAGE_CLASS_NAME);
        embed
    }

    async fn enrich_image(&self, id: &str, embed: &mut EmbedNode) {
        let Some(images) = &self.images else {
            return;
        };

        let record = match images.lookup(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                debug!("Image lookup for {} failed: {}", id, e);
                return;
            }
        };

        if let Some((width, height)) = record.dimensions() {
            embed.push("width", width.to_string());
            embed.push("height", height.to_string());
        }

        if let (Some(base), Some(key)) = (&self.asset_base_url, &record.storage_key) {
            embed.set("src", format!("{}/{}", base, key));
        }
    }

    /// Open Graph data for `url`, read through the cache.
    ///
    /// Results without a title, description or image are returned but not
    /// stored, so the next request retries the fetch.
    pub async fn open_graph(
        &self,
        url: &str,
        policy: CachePolicy,
    ) -> Result<OpenGraphData, CacheError> {
        let source = Arc::clone(&self.previews);
        let target = url.to_string();

        self.cache
            .get_or_compute(&preview_cache_key(url), policy, move || async move {
                let data = source.fetch(&target).await;
                Ok::<_, BoxError>(if data.is_low_value() {
                    Fresh::uncached(data)
                } else {
                    Fresh::new(data)
                })
            })
            .await
    }

    /// Preview for a single link, as served to clients.
    ///
    /// Only http(s) and `data:` URLs are accepted.
    pub async fn preview_link(&self, url: &str) -> Result<LinkPreview, ResolveError> {
        let is_http = url.starts_with("http://") || url.starts_with("https://");
        if !is_http && !url.starts_with("data:") {
            let scheme = url.split_once(':').map_or(url, |(scheme, _)| scheme);
            return Err(ResolveError::UnsupportedScheme(scheme.to_string()));
        }

        let domain = preview_domain(url)?;
        let data = self.open_graph(url, LINK_PREVIEW_POLICY).await?;

        Ok(LinkPreview {
            data,
            domain,
            url: url.to_string(),
        })
    }
}

/// `data-url` for `data:` URLs, otherwise the hostname.
pub fn preview_domain(url: &str) -> Result<Option<String>, ResolveError> {
    if url.starts_with("data:") {
        return Ok(Some(DATA_URL_DOMAIN.to_string()));
    }

    let parsed = Url::parse(url).map_err(|e| ResolveError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    Ok(parsed.host_str().map(str::to_string))
}

/// Id of an internally hosted post image.
pub fn post_image_id(url: &str) -> Option<&str> {
    POST_IMAGE_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
