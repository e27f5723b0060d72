//! Core domain errors.

use thiserror::Error;

/// Core domain errors for distci.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown version-control system name.
    #[error("Unknown version control system: {0}")]
    UnknownVcs(String),

    /// Unknown service kind.
    #[error("Unknown service kind: {0}")]
    UnknownServiceKind(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
