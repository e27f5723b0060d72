//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use distci_core::{BuildFailure, RecordKey, TestId, TestResult, Work, WorkKey, WorkResult};

// ============================================================================
// Work submission
// ============================================================================

/// Response body for `POST /v1/work`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitWorkResponse {
    /// Key the Work was stored under.
    pub key: WorkKey,

    /// Dispatch ID of the scheduled Test.
    pub id: TestId,
}

// ============================================================================
// Results
// ============================================================================

/// One WorkResult with its children.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkResultEntry {
    pub key: RecordKey,
    pub result: WorkResult,
    pub tests: Vec<TestResult>,
    pub build_failures: Vec<BuildFailure>,
}

/// Response body for `GET /v1/work/:key/results`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkResultsResponse {
    pub key: WorkKey,
    pub work: Work,
    pub results: Vec<WorkResultEntry>,
}
