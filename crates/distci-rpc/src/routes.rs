//! Route table shared by servers and clients.
//!
//! Service URLs exchanged in messages are base URLs; these paths are
//! appended to them.

/// Tracker: register a Builder or Runner.
pub const ANNOUNCE: &str = "/rpc/announce";
/// Tracker: deregister a Builder or Runner.
pub const REMOVE: &str = "/rpc/remove";

/// Tracker response endpoint base path (the `response_url` of tasks).
pub const RESPONSE: &str = "/response";
/// Appended to a `response_url`: RunnerResponse.
pub const RESPONSE_POST: &str = "/post";
/// Appended to a `response_url`: BuilderResponse.
pub const RESPONSE_ERROR: &str = "/error";
/// Appended to a `response_url`: DispatchResponse.
pub const RESPONSE_DISPATCH: &str = "/dispatch";

/// Builder: accept a BuilderTask.
pub const BUILD: &str = "/rpc/build";
/// Builder: artifact downloads.
pub const BINARIES: &str = "/bin";

/// Runner host: accept a RunnerTask.
pub const RUN: &str = "/rpc/run";

/// Join a base URL and a path without doubling slashes.
pub fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
