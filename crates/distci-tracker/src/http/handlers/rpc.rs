//! Service registry handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::info;

use distci_core::{ServiceInfo, ServiceKey};
use distci_rpc::{AnnounceArgs, AnnounceReply, Empty, IntoRpc, RemoveArgs};

use crate::http::RpcFailure;
use crate::state::AppState;

/// Register a Builder or Runner and hand back its key.
pub async fn announce(
    State(state): State<Arc<AppState>>,
    Json(args): Json<AnnounceArgs>,
) -> Result<Json<AnnounceReply>, RpcFailure> {
    let key = ServiceKey::generate();
    let service = ServiceInfo {
        key: key.clone(),
        kind: args.kind,
        goos: args.goos,
        goarch: args.goarch,
        url: args.url,
    };

    info!(
        service_key = %key,
        kind = %service.kind,
        platform = %service.config(),
        url = %service.url,
        "Service announced"
    );
    state.store.put_service(service).await.into_rpc()?;

    Ok(Json(AnnounceReply { key }))
}

/// Deregister a service. Removing an unknown key is not an error.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Json(args): Json<RemoveArgs>,
) -> Result<Json<Empty>, RpcFailure> {
    let removed = state.store.remove_service(&args.key).await.into_rpc()?;
    info!(service_key = %args.key, kind = %args.kind, removed, "Service removed");
    Ok(Json(Empty {}))
}
