//! Response endpoint: where Runners, Builders and the dispatcher report.

use std::sync::Arc;

use axum::{extract::State, Json};

use distci_rpc::{BuilderResponse, DispatchResponse, Empty, IntoRpc, RunnerResponse};

use crate::http::RpcFailure;
use crate::state::AppState;

/// `Post`: a Runner's outputs.
pub async fn post_result(
    State(state): State<Arc<AppState>>,
    Json(resp): Json<RunnerResponse>,
) -> Result<Json<Empty>, RpcFailure> {
    state.reconciler.post(resp).await.into_rpc()?;
    Ok(Json(Empty {}))
}

/// `Error`: a Builder could not produce anything to run.
pub async fn post_error(
    State(state): State<Arc<AppState>>,
    Json(resp): Json<BuilderResponse>,
) -> Result<Json<Empty>, RpcFailure> {
    state.reconciler.error(resp).await.into_rpc()?;
    Ok(Json(Empty {}))
}

/// `Dispatch`: a Test could not be handed to any Builder.
pub async fn post_dispatch_failure(
    State(state): State<Arc<AppState>>,
    Json(resp): Json<DispatchResponse>,
) -> Result<Json<Empty>, RpcFailure> {
    state.reconciler.dispatch_failed(resp).await.into_rpc()?;
    Ok(Json(Empty {}))
}
