//! Builder configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use distci_core::BuildConfig;

/// Builder configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "distci-builder", about = "distci builder: compiles test binaries for the tracker")]
pub struct Config {
    /// HTTP server bind address.
    #[arg(long, env = "DISTCI_BIND_ADDR", default_value = "127.0.0.1:9080")]
    pub bind_addr: String,

    /// Base URL the tracker and runners use to reach this builder.
    #[arg(long, env = "DISTCI_PUBLIC_URL", default_value = "http://127.0.0.1:9080")]
    pub public_url: String,

    /// Tracker base URL.
    #[arg(long, env = "DISTCI_TRACKER_URL", default_value = "http://127.0.0.1:8080")]
    pub tracker_url: String,

    /// Go toolchain executable.
    #[arg(long, env = "DISTCI_GO_BIN", default_value = "go")]
    pub go_bin: String,

    /// Target operating system (defaults to the host's).
    #[arg(long, env = "DISTCI_GOOS")]
    pub goos: Option<String>,

    /// Target architecture (defaults to the host's).
    #[arg(long, env = "DISTCI_GOARCH")]
    pub goarch: Option<String>,

    /// Directory for GOPATH workspaces and artifacts.
    #[arg(long, env = "DISTCI_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Age after which compiled binaries are deleted (seconds).
    #[arg(long, env = "DISTCI_ARTIFACT_TTL_SECS", default_value = "3600")]
    pub artifact_ttl_secs: u64,

    /// Delay between announce attempts (seconds).
    #[arg(long, env = "DISTCI_ANNOUNCE_RETRY_SECS", default_value = "5")]
    pub announce_retry_secs: u64,

    /// Timeout for outgoing RPC calls (seconds).
    #[arg(long, env = "DISTCI_RPC_TIMEOUT_SECS", default_value = "30")]
    pub rpc_timeout_secs: u64,
}

impl Config {
    /// The configuration this builder compiles for.
    pub fn build_config(&self) -> BuildConfig {
        let host = BuildConfig::host();
        BuildConfig::new(
            self.goos.clone().unwrap_or(host.goos),
            self.goarch.clone().unwrap_or(host.goarch),
        )
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("distci-builder"))
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    pub fn announce_retry(&self) -> Duration {
        Duration::from_secs(self.announce_retry_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9080".to_string(),
            public_url: "http://127.0.0.1:9080".to_string(),
            tracker_url: "http://127.0.0.1:8080".to_string(),
            go_bin: "go".to_string(),
            goos: None,
            goarch: None,
            work_dir: None,
            artifact_ttl_secs: 3600,
            announce_retry_secs: 5,
            rpc_timeout_secs: 30,
        }
    }
}
