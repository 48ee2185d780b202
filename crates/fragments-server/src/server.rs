//! HTTP server for the compile pipeline.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use fragments_bundle::BundleCompiler;

use crate::routes::{resource_routes, AppState};

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Directory compiled by `POST /resources/prewarm`
    pub content_dir: PathBuf,

    /// Compiles in flight during a prewarm
    pub prewarm_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            content_dir: PathBuf::from("content"),
            prewarm_concurrency: 2,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address {0}: {1}")]
    InvalidAddress(String, String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("Server error: {0}")]
    Serve(String),
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    resource_routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Pipeline server.
pub struct FragmentsServer {
    config: ServerConfig,
    compiler: BundleCompiler,
}

impl FragmentsServer {
    pub fn new(config: ServerConfig, compiler: BundleCompiler) -> Self {
        Self { config, compiler }
    }

    /// Bind and serve until the process is stopped.
    pub async fn start(self) -> Result<(), ServerError> {
        let raw = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = raw
            .parse()
            .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress(raw.clone(), e.to_string()))?;

        let state = AppState::new(
            self.compiler,
            self.config.content_dir.clone(),
            self.config.prewarm_concurrency,
        );
        let app = router(state);

        tracing::info!("Starting server at http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        Ok(())
    }
}
