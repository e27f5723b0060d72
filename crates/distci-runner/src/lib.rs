//! distci Runner Library
//!
//! [`exec`] is the single-shot runner process; [`host`] is the service
//! that spawns one runner per test binary and reports back to the tracker.

pub mod error;
pub mod exec;
pub mod host;

pub use error::{HostError, RunError};
pub use host::{HostConfig, RunnerHost};
