//! HTTP server for the tracker.
//!
//! Provides endpoints for:
//! - Service registry (`/rpc/announce`, `/rpc/remove`)
//! - Builder/Runner responses (`/response/post`, `/response/error`,
//!   `/response/dispatch`)
//! - Work submission and results (`/v1/work`, `/v1/work/:key/results`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use distci_rpc::{routes, RpcError};

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let response = |path: &str| format!("{}{}", routes::RESPONSE, path);

    Router::new()
        // Service registry
        .route(routes::ANNOUNCE, post(handlers::announce))
        .route(routes::REMOVE, post(handlers::remove))
        // Responses from Builders, Runners and the dispatcher
        .route(&response(routes::RESPONSE_POST), post(handlers::post_result))
        .route(&response(routes::RESPONSE_ERROR), post(handlers::post_error))
        .route(&response(routes::RESPONSE_DISPATCH), post(handlers::post_dispatch_failure))
        // API routes
        .route("/v1/work", post(handlers::submit_work))
        .route("/v1/work/:key/results", get(handlers::work_results))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A failed handler. Always replies with an [`RpcError`] body.
#[derive(Debug)]
pub struct RpcFailure {
    status: StatusCode,
    error: RpcError,
}

impl RpcFailure {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: RpcError::new(message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: RpcError::new(message),
        }
    }
}

impl From<RpcError> for RpcFailure {
    fn from(error: RpcError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }
}

impl IntoResponse for RpcFailure {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
