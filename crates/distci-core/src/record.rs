//! Persisted records.
//!
//! A [`WorkResult`] lives under the key of its Work item; [`TestResult`] and
//! [`BuildFailure`] rows live under the key of their WorkResult.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Output, TestId, WorkKey};

/// Existence record proving a dispatch is still awaited.
///
/// Created once when a Test is dispatched and consumed by the first
/// response for its ID. It is never recreated for the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TestId,
    pub key: WorkKey,
    pub work_rev: u32,
    pub created_at: DateTime<Utc>,
}

impl TaskInfo {
    pub fn new(id: TestId, key: WorkKey, work_rev: u32) -> Self {
        Self {
            id,
            key,
            work_rev,
            created_at: Utc::now(),
        }
    }

    /// Whether a response's routing data agrees with this dispatch.
    pub fn matches(&self, key: &WorkKey, work_rev: u32) -> bool {
        &self.key == key && self.work_rev == work_rev
    }
}

/// Outcome of one reconciled attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkResult {
    pub success: bool,
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub error: String,
}

impl WorkResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            when: Utc::now(),
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            when: Utc::now(),
            error: error.into(),
        }
    }
}

/// Output of one executed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub import_path: String,
    pub revision: String,
    pub rev_date: Option<DateTime<Utc>>,
    pub when: DateTime<Utc>,
    pub output: String,
    pub passed: bool,
}

impl TestResult {
    /// Derive a row from a Runner output. `passed` comes from the text.
    pub fn from_output(out: &Output, revision: &str, rev_date: Option<DateTime<Utc>>) -> Self {
        Self {
            import_path: out.import_path.clone(),
            revision: revision.to_string(),
            rev_date,
            when: Utc::now(),
            output: out.output.clone(),
            passed: out.passed(),
        }
    }
}

/// Compiler output of one target that would not build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFailure {
    pub import_path: String,
    pub revision: String,
    pub rev_date: Option<DateTime<Utc>>,
    pub when: DateTime<Utc>,
    pub output: String,
}

impl BuildFailure {
    pub fn from_output(out: &Output, revision: &str, rev_date: Option<DateTime<Utc>>) -> Self {
        Self {
            import_path: out.import_path.clone(),
            revision: revision.to_string(),
            rev_date,
            when: Utc::now(),
            output: out.output.clone(),
        }
    }
}
