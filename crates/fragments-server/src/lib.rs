//! HTTP surface for the MDX pipeline.
//!
//! Serves link previews and exposes compile, prewarm and invalidation
//! endpoints for content-serving and admin routes.

pub mod routes;
pub mod server;

pub use routes::{resource_routes, ApiError, AppState, LINK_PREVIEW_CACHE_CONTROL};
pub use server::{router, FragmentsServer, ServerConfig, ServerError};
