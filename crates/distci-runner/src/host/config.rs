//! Runner host configuration.

use std::time::Duration;

use clap::Parser;

use distci_core::BuildConfig;

/// Runner host configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "distci-runner-host", about = "distci runner host: runs test binaries for builders")]
pub struct HostConfig {
    /// HTTP server bind address.
    #[arg(long, env = "DISTCI_BIND_ADDR", default_value = "127.0.0.1:9090")]
    pub bind_addr: String,

    /// Base URL builders and runner processes use to reach this host.
    #[arg(long, env = "DISTCI_PUBLIC_URL", default_value = "http://127.0.0.1:9090")]
    pub public_url: String,

    /// Tracker base URL.
    #[arg(long, env = "DISTCI_TRACKER_URL", default_value = "http://127.0.0.1:8080")]
    pub tracker_url: String,

    /// Single-shot runner executable.
    #[arg(long, env = "DISTCI_RUNNER_BIN", default_value = "distci-runner")]
    pub runner_bin: String,

    /// Operating system of the binaries this host runs (defaults to the host's).
    #[arg(long, env = "DISTCI_GOOS")]
    pub goos: Option<String>,

    /// Architecture of the binaries this host runs (defaults to the host's).
    #[arg(long, env = "DISTCI_GOARCH")]
    pub goarch: Option<String>,

    /// Time one runner process may take before it is killed (seconds).
    #[arg(long, env = "DISTCI_RUN_TIMEOUT_SECS", default_value = "600")]
    pub run_timeout_secs: u64,

    /// Delay between announce attempts (seconds).
    #[arg(long, env = "DISTCI_ANNOUNCE_RETRY_SECS", default_value = "5")]
    pub announce_retry_secs: u64,

    /// Timeout for outgoing RPC calls (seconds).
    #[arg(long, env = "DISTCI_RPC_TIMEOUT_SECS", default_value = "30")]
    pub rpc_timeout_secs: u64,
}

impl HostConfig {
    pub fn build_config(&self) -> BuildConfig {
        let host = BuildConfig::host();
        BuildConfig::new(
            self.goos.clone().unwrap_or(host.goos),
            self.goarch.clone().unwrap_or(host.goarch),
        )
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn announce_retry(&self) -> Duration {
        Duration::from_secs(self.announce_retry_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            public_url: "http://127.0.0.1:9090".to_string(),
            tracker_url: "http://127.0.0.1:8080".to_string(),
            runner_bin: "distci-runner".to_string(),
            goos: None,
            goarch: None,
            run_timeout_secs: 600,
            announce_retry_secs: 5,
            rpc_timeout_secs: 30,
        }
    }
}
