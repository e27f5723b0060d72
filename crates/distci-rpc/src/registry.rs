//! Service registration with the tracker.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use distci_core::{BuildConfig, ServiceKey, ServiceKind};

use crate::client::RpcClient;
use crate::messages::{AnnounceArgs, RemoveArgs};

/// A service's registration with one tracker.
pub struct Registration {
    client: RpcClient,
    tracker_url: String,
    kind: ServiceKind,
}

impl Registration {
    pub fn new(client: RpcClient, tracker_url: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            client,
            tracker_url: tracker_url.into(),
            kind,
        }
    }

    /// Announce until the tracker accepts or `shutdown` fires.
    pub async fn announce(
        &self,
        config: &BuildConfig,
        public_url: &str,
        retry: Duration,
        shutdown: &CancellationToken,
    ) -> Option<ServiceKey> {
        let args = AnnounceArgs::new(self.kind, config, public_url);
        loop {
            match self.client.announce(&self.tracker_url, &args).await {
                Ok(key) => {
                    info!(service_key = %key, kind = %self.kind, tracker = %self.tracker_url, "Announced to tracker");
                    return Some(key);
                }
                Err(e) => {
                    warn!(error = %e, retry_secs = retry.as_secs(), "Announce failed, retrying");
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }

    /// Deregister. Failures are only logged.
    pub async fn remove(&self, key: ServiceKey) {
        let args = RemoveArgs { key, kind: self.kind };
        match self.client.remove(&self.tracker_url, &args).await {
            Ok(()) => info!(service_key = %args.key, "Removed from tracker"),
            Err(e) => warn!(service_key = %args.key, error = %e, "Failed to remove from tracker"),
        }
    }
}
