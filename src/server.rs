//! HTTP surface.
//!
//! Endpoints:
//! - POST /generate        - run the pipeline for `{theme, age_group}`
//! - GET  /health          - liveness probe
//! - GET  /files/<name>    - generated PDFs (prefix configurable)
//!
//! Every error body is `{"detail": "..."}`, including the 500 returned when
//! a handler panics.

use crate::error::ColoringError;
use crate::generate::Generator;
use crate::output::{GenerateResponse, GenerationRequest};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
}

// ============================================================================
// Error Response
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl IntoResponse for ColoringError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            detail: self.public_message(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the application router around a shared generator.
pub fn router(generator: Arc<Generator>) -> Router {
    let config = generator.config();
    let files = ServeDir::new(config.output_dir.clone());
    let files_prefix = config.files_url_prefix.clone();

    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    Router::new()
        .route("/generate", post(generate))
        .route("/health", get(health))
        .nest_service(&files_prefix, files)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { generator })
}

/// Fixed 500 body for a panicking handler; the payload only reaches the log.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    ColoringError::Internal(message.to_string()).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /generate
async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Malformed /generate body: {}", rejection.body_text());
            let body = Json(ErrorResponse {
                detail: rejection.body_text(),
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
        }
    };

    let trust_forwarded = state.generator.config().trust_forwarded_for;
    let client = client_key(
        &headers,
        connect.map(|ConnectInfo(addr)| addr),
        trust_forwarded,
    );
    match state
        .generator
        .generate_and_store(&request, client.as_deref())
        .await
    {
        Ok(response) => Json::<GenerateResponse>(response).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Peer IP, or the first `X-Forwarded-For` hop when the proxy is trusted.
fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> Option<String> {
    let forwarded = trust_forwarded
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);
    forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
}

// ============================================================================
// Serving
// ============================================================================

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(addr: SocketAddr, generator: Arc<Generator>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, generator, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_on<F>(
    listener: TcpListener,
    generator: Arc<Generator>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Coloring-page server listening on {}", listener.local_addr()?);
    let app = router(generator);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
