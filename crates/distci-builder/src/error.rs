//! Builder errors.

use std::path::PathBuf;

use thiserror::Error;

use distci_core::CoreError;
use distci_rpc::ClientError;

/// Errors that can occur while building a task.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A tool ran and exited unsuccessfully. `output` is its combined output.
    #[error("{program} failed ({status}): {output}")]
    Command {
        program: String,
        status: String,
        output: String,
    },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No repository metadata was found above the package directory.
    #[error("No repository found for {0}")]
    NoRepository(PathBuf),

    /// Revision info printed by the VCS could not be parsed.
    #[error("Unreadable revision info: {0}")]
    RevisionInfo(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl BuildError {
    /// Text to report for a target that failed to compile.
    pub fn report(&self) -> String {
        match self {
            BuildError::Command { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }
}
