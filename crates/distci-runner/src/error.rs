//! Runner errors.

use thiserror::Error;

use distci_rpc::ClientError;

/// Failures of a single run. The message is what gets posted to the
/// error URL, so each variant says which step failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("error creating temp file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("error downloading binary: {0}")]
    Download(#[source] ClientError),

    #[error("error writing binary: {0}")]
    Write(#[source] std::io::Error),

    #[error("error changing permissions on binary: {0}")]
    Chmod(#[source] std::io::Error),

    #[error("error running test binary: {0}")]
    Exec(#[source] std::io::Error),

    #[error("error posting to response url: {0}")]
    Post(#[source] ClientError),
}

/// Errors of the runner host service.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to spawn runner: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}
