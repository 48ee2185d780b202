//! MDX compilation pipeline.
//!
//! [`BundleCompiler`] parses a post, resolves its directives and images into
//! embeds through [`DirectiveResolver`], and generates an executable document
//! module. Results are cached by content hash; [`invalidate`] evicts what a
//! post edit makes stale.

pub mod compiler;
pub mod generator;
pub mod images;
pub mod invalidate;
pub mod resolver;

pub use compiler::{
    bundle_cache_key, discover_sources, BundleCompiler, CompileError, CompileOptions,
    CompiledBundle, PrewarmReport, SourceDocument, BUNDLE_POLICY, PIPELINE_VERSION,
};
pub use generator::{generate_module, used_components};
pub use images::{ImageRecord, ImageStore, JsonImageStore, MemoryImageStore};
pub use invalidate::{extract_preview_urls, invalidate, invalidation_keys, Invalidation};
pub use resolver::{
    post_image_id, preview_cache_key, preview_domain, DirectiveResolver, LinkPreview,
    ResolveError, EMBED_PREVIEW_POLICY, LINK_PREVIEW_POLICY,
};
