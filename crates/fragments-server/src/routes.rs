//! Resource endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use fragments_bundle::{
    discover_sources, invalidate, BundleCompiler, CompileError, CompileOptions, CompiledBundle,
    Invalidation, LinkPreview, PrewarmReport, ResolveError,
};

/// `Cache-Control` sent with link previews.
pub const LINK_PREVIEW_CACHE_CONTROL: &str = "public, max-age=600";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub compiler: BundleCompiler,
    pub content_dir: Arc<PathBuf>,
    pub prewarm_concurrency: usize,
}

impl AppState {
    pub fn new(compiler: BundleCompiler, content_dir: PathBuf, prewarm_concurrency: usize) -> Self {
        Self {
            compiler,
            content_dir: Arc::new(content_dir),
            prewarm_concurrency,
        }
    }
}

/// Error returned by handlers, rendered as a plain-text response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

impl From<CompileError> for ApiError {
    fn from(error: CompileError) -> Self {
        match &error {
            CompileError::EmptySource => Self::BadRequest(error.to_string()),
            e if e.is_caller_error() => Self::Unprocessable(error.to_string()),
            _ => {
                tracing::error!("Compile failed: {}", error);
                Self::Internal("Failed to compile".to_string())
            }
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(error: ResolveError) -> Self {
        match &error {
            ResolveError::UnsupportedScheme(_) => Self::BadRequest("Invalid URL scheme".to_string()),
            ResolveError::InvalidUrl { .. } => Self::BadRequest(error.to_string()),
            ResolveError::Cache(e) => {
                tracing::error!("Failed to fetch metadata: {}", e);
                Self::Internal("Failed to fetch metadata".to_string())
            }
        }
    }
}

pub fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/resources/link-preview", get(link_preview))
        .route("/resources/compile", post(compile))
        .route("/resources/prewarm", post(prewarm))
        .route("/resources/invalidate", post(invalidate_post))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "fragments"
    }))
}

#[derive(Debug, Deserialize)]
struct LinkPreviewQuery {
    url: Option<String>,
}

async fn link_preview(
    State(state): State<AppState>,
    Query(query): Query<LinkPreviewQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL parameter is required".to_string()))?;

    let preview: LinkPreview = state.compiler.resolver().preview_link(&url).await?;

    Ok((
        [(header::CACHE_CONTROL, LINK_PREVIEW_CACHE_CONTROL)],
        Json(preview),
    ))
}

#[derive(Debug, Deserialize)]
struct CompileRequest {
    #[serde(default)]
    source: String,
    title: Option<String>,
}

async fn compile(
    State(state): State<AppState>,
    Json(request): Json<CompileRequest>,
) -> Result<Json<CompiledBundle>, ApiError> {
    let options = CompileOptions {
        title: request.title,
    };
    let bundle = state.compiler.compile(&request.source, &options).await?;
    Ok(Json(bundle))
}

async fn prewarm(State(state): State<AppState>) -> Result<Json<PrewarmReport>, ApiError> {
    let dir = Arc::clone(&state.content_dir);
    let documents = tokio::task::spawn_blocking(move || discover_sources(&dir))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let report = state
        .compiler
        .prewarm(documents, state.prewarm_concurrency)
        .await;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct InvalidateRequest {
    old_content: Option<String>,
    new_content: Option<String>,
    old_title: Option<String>,
    new_title: Option<String>,
}

/// Evict caches for an edited post, then recompile the new content without
/// waiting for it.
async fn invalidate_post(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> Json<Value> {
    let invalidation = Invalidation {
        old_content: request.old_content,
        new_content: request.new_content,
        old_title: request.old_title,
        new_title: request.new_title,
    };

    let keys = invalidate(state.compiler.cache(), &invalidation).await;

    let warming = match invalidation.new_content.filter(|c| !c.is_empty()) {
        Some(content) => {
            let options = CompileOptions {
                title: invalidation.new_title,
            };
            drop(state.compiler.warm_in_background(content, options));
            true
        }
        None => false,
    };

    Json(json!({
        "invalidated": keys,
        "warming": warming,
    }))
}
