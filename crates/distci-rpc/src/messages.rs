//! Message envelopes.
//!
//! Each envelope carries everything its receiver needs (callback URLs, IDs,
//! Work revision) so no side-channel lookup is ever required.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use distci_core::{BuildConfig, Output, ServiceKey, ServiceKind, TestId, Work, WorkKey};

// ============================================================================
// Registration
// ============================================================================

/// Arguments of `Announce`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceArgs {
    pub goos: String,
    pub goarch: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    /// Base URL the service accepts calls on.
    pub url: String,
}

impl AnnounceArgs {
    pub fn new(kind: ServiceKind, config: &BuildConfig, url: impl Into<String>) -> Self {
        Self {
            goos: config.goos.clone(),
            goarch: config.goarch.clone(),
            kind,
            url: url.into(),
        }
    }
}

/// Reply of `Announce`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceReply {
    pub key: ServiceKey,
}

/// Arguments of `Remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveArgs {
    pub key: ServiceKey,
    pub kind: ServiceKind,
}

/// Empty reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

// ============================================================================
// Tasks
// ============================================================================

/// Tracker -> Builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderTask {
    pub work: Work,
    pub key: WorkKey,
    pub id: TestId,
    pub work_rev: u32,
    /// Base URL of the Runner to forward binaries to.
    pub runner_url: String,
    /// Base URL of the Tracker response endpoint.
    pub response_url: String,
}

/// One binary to download and run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTest {
    pub binary_url: String,
    pub import_path: String,
    pub config: BuildConfig,
}

/// Builder -> Runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerTask {
    pub key: WorkKey,
    pub id: TestId,
    pub work_rev: u32,
    pub revision: String,
    pub rev_date: Option<DateTime<Utc>>,
    pub tests: Vec<RunTest>,
    #[serde(default)]
    pub wont_builds: Vec<Output>,
    pub response_url: String,
}

// ============================================================================
// Results
// ============================================================================

/// Runner -> Tracker, once every binary of a task has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerResponse {
    pub key: WorkKey,
    pub id: TestId,
    pub work_rev: u32,
    pub revision: String,
    pub rev_date: Option<DateTime<Utc>>,
    pub tests: Vec<Output>,
}

impl RunnerResponse {
    /// Response for a task: run outputs first, then the forwarded WontBuilds.
    pub fn for_task(task: &RunnerTask, mut outputs: Vec<Output>) -> Self {
        outputs.extend(task.wont_builds.iter().cloned());
        Self {
            key: task.key.clone(),
            id: task.id.clone(),
            work_rev: task.work_rev,
            revision: task.revision.clone(),
            rev_date: task.rev_date,
            tests: outputs,
        }
    }
}

/// Builder -> Tracker, when a task could not produce anything to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderResponse {
    pub key: WorkKey,
    pub id: TestId,
    pub work_rev: u32,
    pub error: String,
    /// Known only if resolution got that far.
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub rev_date: Option<DateTime<Utc>>,
    /// WontBuild outputs of every target when none compiled.
    #[serde(default)]
    pub build_errors: Vec<Output>,
}

impl BuilderResponse {
    /// Setup-level failure of a task.
    pub fn failed(task: &BuilderTask, error: impl Into<String>) -> Self {
        Self {
            key: task.key.clone(),
            id: task.id.clone(),
            work_rev: task.work_rev,
            error: error.into(),
            revision: String::new(),
            rev_date: None,
            build_errors: Vec::new(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>, rev_date: Option<DateTime<Utc>>) -> Self {
        self.revision = revision.into();
        self.rev_date = rev_date;
        self
    }

    pub fn with_build_errors(mut self, build_errors: Vec<Output>) -> Self {
        self.build_errors = build_errors;
        self
    }
}

/// Dispatcher -> Tracker, after retries for a dispatch are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub key: WorkKey,
    pub id: TestId,
    pub error: String,
    pub work_rev: u32,
}
