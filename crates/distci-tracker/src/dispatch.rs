//! Dispatch of admitted Tests to Builders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{error, info, warn};

use distci_core::{ServiceInfo, ServiceKind, TaskInfo, Test, TestId, WorkResult};
use distci_rpc::{routes, BuilderTask, ClientError, DispatchResponse, Empty, RpcClient};

use crate::store::{Store, StoreError};

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No builders registered")]
    NoBuilders,

    #[error("No runner registered for {0}")]
    NoRunner(String),

    #[error("Failed to send task to builder: {0}")]
    SendFailed(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues one slot-holding Test to the outside world.
///
/// Called by the Scheduler after it has acquired a slot for `id`. An `Err`
/// means the attempt is abandoned and its slot must be reclaimed.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, test: &Test, id: &TestId) -> Result<(), DispatchError>;
}

/// Dispatcher that posts `BuilderTask`s to registered Builders.
pub struct HttpDispatcher {
    store: Arc<dyn Store>,
    client: RpcClient,
    response_url: String,
    attempts: u32,
    backoff: Duration,
}

impl HttpDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        client: RpcClient,
        response_url: impl Into<String>,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            store,
            client,
            response_url: response_url.into(),
            attempts: attempts.max(1),
            backoff,
        }
    }

    async fn try_dispatch(&self, test: &Test, id: &TestId) -> Result<(), DispatchError> {
        let builders = self.store.find_services(ServiceKind::Builder).await?;
        let runners = self.store.find_services(ServiceKind::Runner).await?;
        let (builder, runner) = select_pair(&builders, &runners)?;

        let task = BuilderTask {
            work: test.work.clone(),
            key: test.key.clone(),
            id: id.clone(),
            work_rev: test.work_rev,
            runner_url: runner.url.clone(),
            response_url: self.response_url.clone(),
        };

        info!(
            test_id = %id,
            builder = %builder.url,
            runner = %runner.url,
            import_path = %test.work.import_path,
            "Dispatching test to builder"
        );

        let _: Empty = self
            .client
            .call(&routes::join(&builder.url, routes::BUILD), &task)
            .await?;
        Ok(())
    }

    /// Tell the response endpoint this dispatch is dead.
    async fn escalate(&self, test: &Test, id: &TestId, err: &DispatchError) {
        let msg = DispatchResponse {
            key: test.key.clone(),
            id: id.clone(),
            error: format!("dispatch failed after {} attempts: {}", self.attempts, err),
            work_rev: test.work_rev,
        };
        let url = routes::join(&self.response_url, routes::RESPONSE_DISPATCH);
        if let Err(e) = self.client.call::<_, Empty>(&url, &msg).await {
            error!(test_id = %id, error = %e, "Failed to report dispatch failure, recording locally");
            self.record_locally(&msg).await;
        }
    }

    /// Claim the TaskInfo and write the failed WorkResult without the
    /// response endpoint. A response that claimed it first wins.
    async fn record_locally(&self, msg: &DispatchResponse) {
        let info = match self.store.consume_task_info(&msg.id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                warn!(test_id = %msg.id, "Dispatch already reconciled");
                return;
            }
            Err(e) => {
                error!(test_id = %msg.id, error = %e, "Failed to claim TaskInfo");
                return;
            }
        };
        if let Err(e) = self
            .store
            .put_work_result(&info.key, &WorkResult::failed(&msg.error))
            .await
        {
            error!(test_id = %msg.id, error = %e, "Failed to record dispatch failure");
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, test: &Test, id: &TestId) -> Result<(), DispatchError> {
        self.store
            .create_task_info(TaskInfo::new(id.clone(), test.key.clone(), test.work_rev))
            .await?;

        let mut attempt = 1;
        loop {
            match self.try_dispatch(test, id).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.attempts => {
                    error!(test_id = %id, attempts = attempt, error = %err, "Giving up on dispatch");
                    self.escalate(test, id, &err).await;
                    return Err(err);
                }
                Err(err) => {
                    warn!(test_id = %id, attempt, error = %err, "Dispatch attempt failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Pick a random Builder and a random Runner that can run what it builds.
pub fn select_pair<'a>(
    builders: &'a [ServiceInfo],
    runners: &'a [ServiceInfo],
) -> Result<(&'a ServiceInfo, &'a ServiceInfo), DispatchError> {
    if builders.is_empty() {
        return Err(DispatchError::NoBuilders);
    }

    let mut rng = rand::thread_rng();
    let mut order: Vec<&ServiceInfo> = builders.iter().collect();
    order.shuffle(&mut rng);

    for &builder in &order {
        let config = builder.config();
        let matching: Vec<&ServiceInfo> = runners.iter().filter(|r| r.runs(&config)).collect();
        if let Some(&runner) = matching.choose(&mut rng) {
            return Ok((builder, runner));
        }
    }

    let platforms: Vec<String> = order.iter().map(|b| b.config().to_string()).collect();
    Err(DispatchError::NoRunner(platforms.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use distci_core::{ServiceKey, Work};

    use crate::store::MemoryStore;

    fn svc(kind: ServiceKind, goarch: &str, url: &str) -> ServiceInfo {
        ServiceInfo {
            key: ServiceKey::generate(),
            kind,
            goos: "linux".into(),
            goarch: goarch.into(),
            url: url.into(),
        }
    }

    #[test]
    fn test_select_pair_requires_builder() {
        let runners = vec![svc(ServiceKind::Runner, "amd64", "http://r")];
        assert!(matches!(select_pair(&[], &runners), Err(DispatchError::NoBuilders)));
    }

    #[test]
    fn test_select_pair_matches_platform() {
        let builders = vec![
            svc(ServiceKind::Builder, "arm64", "http://b-arm"),
            svc(ServiceKind::Builder, "amd64", "http://b-amd"),
        ];
        let runners = vec![svc(ServiceKind::Runner, "amd64", "http://r-amd")];

        for _ in 0..20 {
            let (b, r) = select_pair(&builders, &runners).unwrap();
            assert_eq!(b.url, "http://b-amd");
            assert_eq!(r.url, "http://r-amd");
        }
    }

    #[test]
    fn test_select_pair_without_matching_runner() {
        let builders = vec![svc(ServiceKind::Builder, "arm64", "http://b")];
        let runners = vec![svc(ServiceKind::Runner, "amd64", "http://r")];
        let err = select_pair(&builders, &runners).unwrap_err();
        assert!(matches!(err, DispatchError::NoRunner(ref p) if p == "linux/arm64"));
    }

    #[tokio::test]
    async fn test_unreachable_response_endpoint_records_failure_locally() {
        let store = Arc::new(MemoryStore::new());
        let key = store.create_work(&Work::new("example.com/orphan")).await.unwrap();
        let dispatcher = HttpDispatcher::new(
            store.clone(),
            RpcClient::new(Duration::from_secs(1)).unwrap(),
            "http://127.0.0.1:1/response",
            1,
            Duration::ZERO,
        );

        let test = Test::new(key.clone(), Work::new("example.com/orphan"), 1);
        let id = test.whole_id();
        let err = dispatcher.dispatch(&test, &id).await.unwrap_err();
        assert!(matches!(err, DispatchError::NoBuilders));

        assert_eq!(store.pending_task_infos().await, 0);
        let results = store.find_work_results(&key).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].1.success);
        assert!(results[0].1.error.contains("No builders registered"));
    }
}
