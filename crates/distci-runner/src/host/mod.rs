//! Runner host: the long-lived service behind a runner URL.
//!
//! For every RunTest in a RunnerTask the host starts one single-shot
//! `distci-runner` process whose report URLs point back at the host, then
//! posts all collected outputs to the tracker as one RunnerResponse.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use distci_core::Output;
use distci_rpc::{routes, Empty, RpcClient, RunTest, RunnerResponse, RunnerTask};

use crate::error::HostError;

pub mod config;
pub mod http;

pub use config::HostConfig;

/// How long a runner may linger after it has reported.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// What a runner process posted back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Output(String),
    Error(String),
}

/// Spawns runner processes and collects their reports.
pub struct RunnerHost {
    client: RpcClient,
    runner_bin: String,
    public_url: String,
    run_timeout: Duration,
    /// Runs waiting for their callback, by run ID.
    pending: Mutex<HashMap<String, oneshot::Sender<Report>>>,
}

impl RunnerHost {
    pub fn new(
        client: RpcClient,
        runner_bin: impl Into<String>,
        public_url: impl Into<String>,
        run_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            runner_bin: runner_bin.into(),
            public_url: public_url.into(),
            run_timeout,
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Report>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// IDs of runs still waiting for a report.
    pub fn pending_runs(&self) -> Vec<String> {
        self.pending().keys().cloned().collect()
    }

    /// Hand a callback to its waiting run. False if nobody is waiting.
    pub fn deliver(&self, run_id: &str, report: Report) -> bool {
        match self.pending().remove(run_id) {
            Some(tx) => tx.send(report).is_ok(),
            None => false,
        }
    }

    /// Run every test of `task` and post the RunnerResponse.
    pub async fn handle(self: Arc<Self>, task: RunnerTask) {
        info!(test_id = %task.id, tests = task.tests.len(), "Running task");

        let outputs = join_all(task.tests.iter().map(|test| self.run_one(test))).await;
        if let Err(e) = self.post_results(&task, outputs).await {
            error!(test_id = %task.id, error = %e, "Failed to post results");
        }
    }

    async fn post_results(&self, task: &RunnerTask, outputs: Vec<Output>) -> Result<(), HostError> {
        let resp = RunnerResponse::for_task(task, outputs);
        let url = routes::join(&task.response_url, routes::RESPONSE_POST);
        let _: Empty = self.client.call(&url, &resp).await?;
        info!(test_id = %task.id, outputs = resp.tests.len(), "Results posted");
        Ok(())
    }

    async fn run_one(&self, test: &RunTest) -> Output {
        let run_id = Uuid::new_v4().to_string();
        let (tx, mut rx) = oneshot::channel();
        self.pending().insert(run_id.clone(), tx);

        let base = routes::join(&self.public_url, &format!("/runs/{run_id}"));
        debug!(run_id = %run_id, binary = %test.binary_url, "Spawning runner");

        let spawned = Command::new(&self.runner_bin)
            .arg(&test.binary_url)
            .arg(format!("{base}/output"))
            .arg(format!("{base}/error"))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.pending().remove(&run_id);
                let e = HostError::from(e);
                error!(run_id = %run_id, error = %e, "Runner not started");
                return Output::error(&test.import_path, test.config.clone(), e.to_string());
            }
        };

        let waited = tokio::time::timeout(self.run_timeout, async {
            tokio::select! {
                report = &mut rx => report.ok(),
                status = child.wait() => {
                    // A runner posts before it exits, so its report is already queued.
                    let report = rx.try_recv().ok();
                    if report.is_none() {
                        warn!(run_id = %run_id, status = ?status, "Runner exited without reporting");
                    }
                    report
                }
            }
        })
        .await;
        self.pending().remove(&run_id);

        let output = match waited {
            Ok(Some(Report::Output(text))) => Output::success(&test.import_path, test.config.clone(), text),
            Ok(Some(Report::Error(text))) => Output::error(&test.import_path, test.config.clone(), text),
            Ok(None) => Output::error(
                &test.import_path,
                test.config.clone(),
                "runner exited without reporting",
            ),
            Err(_) => {
                warn!(run_id = %run_id, "Runner timed out, killing");
                if let Err(e) = child.start_kill() {
                    debug!(run_id = %run_id, error = %e, "Runner already gone");
                }
                Output::error(
                    &test.import_path,
                    test.config.clone(),
                    format!("runner timed out after {}s", self.run_timeout.as_secs()),
                )
            }
        };
        let _ = tokio::time::timeout(EXIT_GRACE, child.wait()).await;
        output
    }
}
