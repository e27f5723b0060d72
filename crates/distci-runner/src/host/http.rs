//! HTTP server for the runner host.
//!
//! - `POST /rpc/run` accepts a RunnerTask
//! - `POST /runs/:id/output` and `POST /runs/:id/error` receive runner reports
//! - `GET /health`

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use distci_rpc::{routes, Empty, RpcError, RunnerTask};

use super::{Report, RunnerHost};

/// Shared state for host handlers.
pub struct HostState {
    pub host: Arc<RunnerHost>,
    /// In-flight RunnerTasks, awaited on shutdown.
    pub tasks: TaskTracker,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HostState>) -> Router {
    Router::new()
        .route(routes::RUN, post(run_task))
        .route("/runs/:id/output", post(report_output))
        .route("/runs/:id/error", post(report_error))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn run_task(State(state): State<Arc<HostState>>, Json(task): Json<RunnerTask>) -> Response {
    if state.tasks.is_closed() {
        let err = RpcError::new("runner host is shutting down");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(err)).into_response();
    }

    info!(test_id = %task.id, tests = task.tests.len(), "Runner task accepted");
    state.tasks.spawn(state.host.clone().handle(task));
    Json(Empty {}).into_response()
}

fn deliver(state: &HostState, id: &str, report: Report) -> Response {
    if state.host.deliver(id, report) {
        return StatusCode::OK.into_response();
    }
    warn!(run_id = %id, "Report for unknown run");
    let err = RpcError::new(format!("unknown run: {id}"));
    (StatusCode::NOT_FOUND, Json(err)).into_response()
}

async fn report_output(State(state): State<Arc<HostState>>, Path(id): Path<String>, body: String) -> Response {
    deliver(&state, &id, Report::Output(body))
}

async fn report_error(State(state): State<Arc<HostState>>, Path(id): Path<String>, body: String) -> Response {
    deliver(&state, &id, Report::Error(body))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
