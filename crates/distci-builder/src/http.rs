//! HTTP server for the builder.
//!
//! - `POST /rpc/build` queues a BuilderTask
//! - `GET /bin/:name` serves compiled test binaries to runners
//! - `GET /health`

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use distci_rpc::{routes, BuilderTask, Empty, RpcError};

use crate::artifacts::ArtifactStore;
use crate::builder::TaskSender;

/// Shared state for builder handlers.
pub struct BuilderState {
    pub queue: TaskSender,
    pub artifacts: ArtifactStore,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<BuilderState>) -> Router {
    Router::new()
        .route(routes::BUILD, post(enqueue))
        .route(&format!("{}/:name", routes::BINARIES), get(download))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(RpcError::new(message))).into_response()
}

async fn enqueue(State(state): State<Arc<BuilderState>>, Json(task): Json<BuilderTask>) -> Response {
    info!(test_id = %task.id, import_path = %task.work.import_path, "Build task queued");
    match state.queue.send(task) {
        Ok(()) => Json(Empty {}).into_response(),
        Err(_) => failure(StatusCode::SERVICE_UNAVAILABLE, "builder is shutting down"),
    }
}

async fn download(State(state): State<Arc<BuilderState>>, Path(name): Path<String>) -> Response {
    let Some(path) = state.artifacts.path(&name) else {
        return failure(StatusCode::BAD_REQUEST, format!("invalid artifact name: {name}"));
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::from(bytes),
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            failure(StatusCode::NOT_FOUND, format!("no such artifact: {name}"))
        }
        Err(e) => {
            warn!(name = %name, error = %e, "Failed to read artifact");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use distci_core::{TestId, Work, WorkKey};

    async fn serve(state: Arc<BuilderState>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn test_build_enqueues_task() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let base = serve(Arc::new(BuilderState {
            queue: tx,
            artifacts: ArtifactStore::new(dir.path()),
        }))
        .await;

        let task = BuilderTask {
            work: Work::new("example.com/a"),
            key: WorkKey::new("Work:1"),
            id: TestId::new("t1"),
            work_rev: 1,
            runner_url: "http://r".into(),
            response_url: "http://t/response".into(),
        };
        let resp = reqwest::Client::new()
            .post(routes::join(&base, routes::BUILD))
            .json(&task)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(rx.recv().await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_download_serves_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc-pkg-linux_amd64.test"), b"\x7fELF").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let base = serve(Arc::new(BuilderState {
            queue: tx,
            artifacts: ArtifactStore::new(dir.path()),
        }))
        .await;

        let client = reqwest::Client::new();
        let body = client
            .get(format!("{base}/bin/abc-pkg-linux_amd64.test"))
            .send()
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&body[..], b"\x7fELF");

        let missing = client.get(format!("{base}/bin/nope.test")).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
