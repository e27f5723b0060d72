//! distci Runner Host

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use distci_core::ServiceKind;
use distci_rpc::{Registration, RpcClient};
use distci_runner::host::http::{self, HostState};
use distci_runner::{HostConfig, RunnerHost};

/// How long to wait for in-flight tasks on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    // Load config
    let config = HostConfig::parse();
    let addr: SocketAddr = config.bind_addr.parse()?;
    let build_config = config.build_config();

    info!(
        addr = %addr,
        tracker = %config.tracker_url,
        platform = %build_config,
        runner_bin = %config.runner_bin,
        "Starting distci runner host"
    );

    let shutdown = CancellationToken::new();
    let client = RpcClient::new(config.rpc_timeout())?;
    let host = RunnerHost::new(client.clone(), &config.runner_bin, &config.public_url, config.run_timeout());
    let tasks = TaskTracker::new();

    let state = Arc::new(HostState {
        host,
        tasks: tasks.clone(),
    });
    let listener = TcpListener::bind(addr).await?;
    let server = tokio::spawn(
        axum::serve(listener, http::create_router(state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );
    info!("HTTP server listening on {}", addr);

    let registration = Registration::new(client, &config.tracker_url, ServiceKind::Runner);
    let key = tokio::select! {
        key = registration.announce(&build_config, &config.public_url, config.announce_retry(), &shutdown) => key,
        _ = tokio::signal::ctrl_c() => None,
    };

    if key.is_some() && tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received; shutting down");
    }

    if let Some(key) = key {
        registration.remove(key).await;
    }

    // Runner callbacks still need the server while tasks drain.
    tasks.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, tasks.wait()).await.is_err() {
        warn!(remaining = tasks.len(), "Abandoning in-flight tasks");
    }

    shutdown.cancel();
    match server.await {
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    info!("Runner host stopped");

    Ok(())
}
