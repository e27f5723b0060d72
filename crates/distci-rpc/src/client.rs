//! HTTP client for calling distci services.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use distci_core::ServiceKey;

use crate::error::RpcError;
use crate::messages::{AnnounceArgs, AnnounceReply, Empty, RemoveArgs};
use crate::routes;

/// Errors that can occur when calling another service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote method failed and said why.
    #[error("remote error: {0}")]
    Remote(RpcError),

    /// Non-success status without a readable error body.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// JSON-over-HTTP client used on every hop.
#[derive(Debug, Clone)]
pub struct RpcClient {
    inner: reqwest::Client,
}

impl RpcClient {
    /// Create a client with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { inner })
    }

    /// POST `args` as JSON and decode the JSON reply.
    pub async fn call<A, R>(&self, url: &str, args: &A) -> Result<R, ClientError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(url = %url, "RPC call");

        let response = self.inner.post(url).json(args).send().await?;
        let response = check(url, response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }

    /// POST a plain-text body.
    pub async fn post_text(&self, url: &str, body: String) -> Result<(), ClientError> {
        debug!(url = %url, len = body.len(), "POST text");

        let response = self
            .inner
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;
        check(url, response).await?;
        Ok(())
    }

    /// GET a response body as raw bytes.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        debug!(url = %url, "Downloading");

        let response = self.inner.get(url).send().await?;
        let response = check(url, response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Register with a tracker and return the assigned key.
    pub async fn announce(&self, tracker_url: &str, args: &AnnounceArgs) -> Result<ServiceKey, ClientError> {
        let reply: AnnounceReply = self.call(&routes::join(tracker_url, routes::ANNOUNCE), args).await?;
        Ok(reply.key)
    }

    /// Deregister from a tracker.
    pub async fn remove(&self, tracker_url: &str, args: &RemoveArgs) -> Result<(), ClientError> {
        let _: Empty = self.call(&routes::join(tracker_url, routes::REMOVE), args).await?;
        Ok(())
    }

    /// Check if a service answers its health endpoint.
    pub async fn health(&self, base_url: &str) -> Result<bool, ClientError> {
        let url = routes::join(base_url, "/health");
        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

async fn check(url: &str, response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<RpcError>(&body) {
        Ok(err) => Err(ClientError::Remote(err)),
        Err(_) => Err(ClientError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}
