//! distci Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Storage engines
//! - Runtime specifics
//!
//! Everything the Tracker, Builders and Runners agree on lives here.

pub mod attempt;
pub mod error;
pub mod ids;
pub mod output;
pub mod record;
pub mod service;
pub mod work;

// Re-export commonly used types
pub use attempt::Test;
pub use error::CoreError;
pub use ids::{RecordKey, ServiceKey, TestId, WorkKey};
pub use output::{passed, BuildConfig, Output, OutputType, PASS_SENTINEL};
pub use record::{BuildFailure, TaskInfo, TestResult, WorkResult};
pub use service::{ServiceInfo, ServiceKind};
pub use work::{Vcs, Work};
