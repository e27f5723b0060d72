//! Work submission and inspection handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use distci_core::{Test, Work, WorkKey};
use distci_rpc::IntoRpc;

use crate::http::responses::{SubmitWorkResponse, WorkResultEntry, WorkResultsResponse};
use crate::http::RpcFailure;
use crate::state::AppState;

/// Revision of a freshly stored Work item.
const INITIAL_WORK_REV: u32 = 1;

/// Store a Work item and schedule its first Test.
pub async fn submit_work(
    State(state): State<Arc<AppState>>,
    Json(work): Json<Work>,
) -> Result<Json<SubmitWorkResponse>, RpcFailure> {
    if let Err(e) = work.validate() {
        return Err(RpcFailure::bad_request(e.to_string()));
    }

    let key = state.store.create_work(&work).await.into_rpc()?;
    let test = Test::new(key.clone(), work, INITIAL_WORK_REV);
    let id = state.scheduler.schedule(test).into_rpc()?;

    info!(work_key = %key, test_id = %id, "Work submitted");
    Ok(Json(SubmitWorkResponse { key, id }))
}

/// Every recorded WorkResult for a Work item, with its children.
pub async fn work_results(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<WorkResultsResponse>, RpcFailure> {
    let key = WorkKey::new(key);
    let Some(work) = state.store.find_work(&key).await.into_rpc()? else {
        return Err(RpcFailure::not_found(format!("Work not found: {}", key)));
    };

    let mut results = Vec::new();
    for (rkey, result) in state.store.find_work_results(&key).await.into_rpc()? {
        let tests = state.store.find_test_results(&rkey).await.into_rpc()?;
        let build_failures = state.store.find_build_failures(&rkey).await.into_rpc()?;
        results.push(WorkResultEntry {
            key: rkey,
            result,
            tests,
            build_failures,
        });
    }

    Ok(Json(WorkResultsResponse { key, work, results }))
}
