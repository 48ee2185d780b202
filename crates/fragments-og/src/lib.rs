//! Open Graph metadata for link previews.
//!
//! [`OpenGraphFetcher`] retrieves a page (or decodes a `data:` URL) and
//! extracts `og:*` properties with per-field fallbacks. Fetching never fails;
//! unreachable pages produce empty [`OpenGraphData`].

pub mod data;
pub mod extract;
pub mod fetcher;

pub use data::OpenGraphData;
pub use extract::extract_open_graph;
pub use fetcher::{
    decode_data_url, FetchError, FetcherConfig, OpenGraphFetcher, PreviewSource, DEFAULT_USER_AGENT,
};
