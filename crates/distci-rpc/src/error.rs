//! The one error kind that is safe to transmit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An error that may be serialized into a reply.
///
/// Internal error types never cross a process boundary; each service turns
/// them into an `RpcError` explicitly (via `From` or [`IntoRpc`]) at the
/// handler edge. On the wire this is `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    error: String,
}

impl RpcError {
    /// Create an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    /// Flatten any displayable error into its message.
    pub fn wrap(err: impl fmt::Display) -> Self {
        Self::new(err.to_string())
    }

    /// The transmitted message.
    pub fn message(&self) -> &str {
        &self.error
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)
    }
}

impl std::error::Error for RpcError {}

/// Convert a handler result into one that is safe to reply with.
pub trait IntoRpc<T> {
    fn into_rpc(self) -> Result<T, RpcError>;
}

impl<T, E: fmt::Display> IntoRpc<T> for Result<T, E> {
    fn into_rpc(self) -> Result<T, RpcError> {
        self.map_err(RpcError::wrap)
    }
}
