//! HTTP surface (feature `server`).
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/compress` | [`handlers::compress`] |
//! | POST | `/proxy/compress` | [`handlers::proxy`] (CORS `*`) |
//! | GET | `/auth` | [`handlers::auth`] |
//! | GET | `/oauth2callback` | [`handlers::oauth_callback`] |
//! | GET | `/health` | [`handlers::health`] |
//!
//! Request bodies are capped at the upload limit plus a small allowance for
//! multipart framing and text fields. The file field itself is checked
//! against the exact limit while it streams in. Every 413 is rendered as the
//! JSON envelope, whether or not the client sent `Content-Length`.

pub mod error;
pub mod handlers;

pub use error::{ApiError, Envelope};

use crate::drive::Authorizer;
use crate::error::PressError;
use crate::process::Pipeline;
use crate::remote::RemoteCompressor;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Method, Request},
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Room for multipart boundaries and the cover text fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub authorizer: Option<Arc<Authorizer>>,
    pub remote: Option<Arc<RemoteCompressor>>,
}

impl AppState {
    /// Picks up the pipeline's Drive authorizer, if it has one.
    pub fn new(pipeline: Pipeline) -> Self {
        let authorizer = pipeline.drive().map(|d| Arc::clone(d.authorizer()));
        Self {
            pipeline: Arc::new(pipeline),
            authorizer,
            remote: None,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_remote(mut self, remote: Arc<RemoteCompressor>) -> Self {
        self.remote = Some(remote);
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .pipeline
        .config()
        .max_upload_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    let proxy_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86_400));

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "http.request",
            method = %request.method(),
            route = %request.uri().path(),
        )
    });

    Router::new()
        .route("/compress", post(handlers::compress))
        .route("/proxy/compress", post(handlers::proxy).layer(proxy_cors))
        .route("/auth", get(handlers::auth))
        .route("/oauth2callback", get(handlers::oauth_callback))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(trace_layer)
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), PressError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| PressError::Internal(format!("listener has no address: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PressError::Internal(format!("server error: {e}")))
}
