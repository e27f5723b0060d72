//! The build loop: one BuilderTask at a time, start to finish.
//!
//! For each task the builder resolves the revision, compiles one test
//! binary per target and configuration, and forwards a RunnerTask naming
//! the binaries to the runner picked by the tracker. Anything that stops a
//! RunnerTask from being sent is reported to the tracker as a
//! BuilderResponse instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use distci_core::{BuildConfig, Output};
use distci_rpc::{routes, BuilderResponse, BuilderTask, Empty, RpcClient, RunTest, RunnerTask};

use crate::artifacts::ArtifactStore;
use crate::toolchain::Toolchain;
use crate::vcs::Revision;

/// Sender side of the build queue.
pub type TaskSender = mpsc::UnboundedSender<BuilderTask>;

/// Compiles BuilderTasks and hands the results to runners.
pub struct Builder {
    toolchain: Arc<dyn Toolchain>,
    client: RpcClient,
    artifacts: ArtifactStore,
    configs: Vec<BuildConfig>,
    /// Base URL runners download binaries from.
    public_url: String,
    /// Parent of per-task GOPATH workspaces.
    scratch: PathBuf,
    /// Artifacts older than this are swept before each task.
    artifact_ttl: Duration,
}

/// Default artifact lifetime; long enough for any runner to download.
pub const DEFAULT_ARTIFACT_TTL: Duration = Duration::from_secs(3600);

/// Targets compiled for one task.
struct Compiled {
    tests: Vec<RunTest>,
    wont_builds: Vec<Output>,
}

impl Builder {
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        client: RpcClient,
        artifacts: ArtifactStore,
        configs: Vec<BuildConfig>,
        public_url: impl Into<String>,
        scratch: impl Into<PathBuf>,
    ) -> Self {
        Self {
            toolchain,
            client,
            artifacts,
            configs,
            public_url: public_url.into(),
            scratch: scratch.into(),
            artifact_ttl: DEFAULT_ARTIFACT_TTL,
        }
    }

    /// Builder method to set how long artifacts are kept.
    pub fn with_artifact_ttl(mut self, ttl: Duration) -> Self {
        self.artifact_ttl = ttl;
        self
    }

    /// Process queued tasks one by one until cancelled or the queue closes.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<BuilderTask>, shutdown: CancellationToken) {
        info!(configs = self.configs.len(), "Builder loop started");
        loop {
            let task = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(task) => task,
                    None => break,
                },
            };
            self.process(task).await;
        }
        info!("Builder loop stopped");
    }

    /// Build one task and report the outcome to the runner or the tracker.
    pub async fn process(&self, task: BuilderTask) {
        info!(
            test_id = %task.id,
            import_path = %task.work.import_path,
            revision = %task.work.revision,
            "Processing build task"
        );

        match self.artifacts.sweep(self.artifact_ttl).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Swept expired artifacts"),
            Err(e) => warn!(error = %e, "Failed to sweep artifacts"),
        }

        let workspace = match tempfile::Builder::new().prefix("gopath-").tempdir_in(&self.scratch) {
            Ok(dir) => dir,
            Err(e) => {
                self.report(&task, BuilderResponse::failed(&task, format!("workspace: {e}")))
                    .await;
                return;
            }
        };

        let revision = match self.toolchain.resolve(&task.work, workspace.path()).await {
            Ok(rev) => rev,
            Err(e) => {
                warn!(test_id = %task.id, error = %e, "Revision resolution failed");
                self.report(&task, BuilderResponse::failed(&task, e.to_string())).await;
                return;
            }
        };
        info!(test_id = %task.id, revision = %revision.id, "Revision resolved");

        let targets = match self.toolchain.targets(&task.work, workspace.path()).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(test_id = %task.id, error = %e, "Listing targets failed");
                self.report(
                    &task,
                    BuilderResponse::failed(&task, e.to_string()).with_revision(revision.id, revision.date),
                )
                .await;
                return;
            }
        };

        let compiled = self.compile_all(&task, &targets, workspace.path()).await;

        if compiled.tests.is_empty() {
            let msg = format!("no targets built ({} failed)", compiled.wont_builds.len());
            self.report(
                &task,
                BuilderResponse::failed(&task, msg)
                    .with_revision(revision.id, revision.date)
                    .with_build_errors(compiled.wont_builds),
            )
            .await;
            return;
        }

        self.forward(&task, revision, compiled).await;
    }

    async fn compile_all(&self, task: &BuilderTask, targets: &[String], workspace: &Path) -> Compiled {
        let mut compiled = Compiled {
            tests: Vec::new(),
            wont_builds: Vec::new(),
        };

        for import_path in targets {
            for config in &self.configs {
                let name = ArtifactStore::name_for(&task.id, import_path, config);
                let Some(out) = self.artifacts.path(&name) else {
                    error!(name = %name, "Generated an unusable artifact name");
                    continue;
                };

                match self.toolchain.compile(import_path, config, workspace, &out).await {
                    Ok(true) => {
                        debug!(import_path = %import_path, config = %config, "Compiled");
                        compiled.tests.push(RunTest {
                            binary_url: routes::join(&self.public_url, &format!("{}/{}", routes::BINARIES, name)),
                            import_path: import_path.clone(),
                            config: config.clone(),
                        });
                    }
                    Ok(false) => {
                        debug!(import_path = %import_path, "No test files, skipping");
                    }
                    Err(e) => {
                        info!(import_path = %import_path, config = %config, "Target won't build");
                        compiled
                            .wont_builds
                            .push(Output::wont_build(import_path.clone(), config.clone(), e.report()));
                    }
                }
            }
        }
        compiled
    }

    async fn forward(&self, task: &BuilderTask, revision: Revision, compiled: Compiled) {
        let runner_task = RunnerTask {
            key: task.key.clone(),
            id: task.id.clone(),
            work_rev: task.work_rev,
            revision: revision.id.clone(),
            rev_date: revision.date,
            tests: compiled.tests,
            wont_builds: compiled.wont_builds,
            response_url: task.response_url.clone(),
        };

        info!(
            test_id = %task.id,
            runner = %task.runner_url,
            tests = runner_task.tests.len(),
            wont_builds = runner_task.wont_builds.len(),
            "Forwarding to runner"
        );

        let url = routes::join(&task.runner_url, routes::RUN);
        if let Err(e) = self.client.call::<_, Empty>(&url, &runner_task).await {
            warn!(test_id = %task.id, error = %e, "Runner rejected task");
            if let Err(e) = self.artifacts.purge(&task.id).await {
                warn!(test_id = %task.id, error = %e, "Failed to purge artifacts");
            }
            let resp = BuilderResponse::failed(task, format!("runner unreachable: {e}"))
                .with_revision(revision.id, revision.date);
            self.report(task, resp).await;
        }
    }

    /// Post a BuilderResponse to the tracker. Failures are only logged.
    async fn report(&self, task: &BuilderTask, resp: BuilderResponse) {
        info!(test_id = %resp.id, error = %resp.error, "Reporting build failure");
        let url = routes::join(&task.response_url, routes::RESPONSE_ERROR);
        if let Err(e) = self.client.call::<_, Empty>(&url, &resp).await {
            error!(test_id = %resp.id, error = %e, "Failed to report build failure");
        }
    }
}
