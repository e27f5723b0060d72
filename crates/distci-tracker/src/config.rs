//! Tracker configuration.

use std::time::Duration;

use clap::Parser;

use distci_rpc::routes;

/// Tracker configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "distci-tracker", about = "distci tracker: schedules tests and records results")]
pub struct Config {
    /// HTTP server bind address.
    #[arg(long, env = "DISTCI_BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: String,

    /// Base URL other services use to reach this tracker.
    #[arg(long, env = "DISTCI_PUBLIC_URL", default_value = "http://127.0.0.1:8080")]
    pub public_url: String,

    /// Maximum number of concurrently dispatched tests.
    #[arg(long, env = "DISTCI_SLOTS", default_value = "4")]
    pub slots: usize,

    /// Dispatch attempts per test before giving up.
    #[arg(long, env = "DISTCI_DISPATCH_ATTEMPTS", default_value = "3")]
    pub dispatch_attempts: u32,

    /// Base backoff between dispatch attempts (milliseconds).
    #[arg(long, env = "DISTCI_DISPATCH_BACKOFF_MS", default_value = "500")]
    pub dispatch_backoff_ms: u64,

    /// Timeout for outgoing RPC calls (seconds).
    #[arg(long, env = "DISTCI_RPC_TIMEOUT_SECS", default_value = "30")]
    pub rpc_timeout_secs: u64,
}

impl Config {
    /// URL that Builders and Runners post responses to.
    pub fn response_url(&self) -> String {
        routes::join(&self.public_url, routes::RESPONSE)
    }

    pub fn dispatch_backoff(&self) -> Duration {
        Duration::from_millis(self.dispatch_backoff_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            public_url: "http://127.0.0.1:8080".to_string(),
            slots: 4,
            dispatch_attempts: 3,
            dispatch_backoff_ms: 500,
            rpc_timeout_secs: 30,
        }
    }
}
