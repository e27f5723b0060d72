//! distci Builder Daemon

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use distci_builder::http::{self, BuilderState};
use distci_builder::{ArtifactStore, Builder, Config, GoToolchain};
use distci_core::ServiceKind;
use distci_rpc::{Registration, RpcClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    // Load config
    let config = Config::parse();
    let addr: SocketAddr = config.bind_addr.parse()?;
    let build_config = config.build_config();

    let work_dir = config.work_dir();
    let artifacts = ArtifactStore::new(work_dir.join("bin"));
    let scratch = work_dir.join("scratch");
    tokio::fs::create_dir_all(artifacts.dir()).await?;
    tokio::fs::create_dir_all(&scratch).await?;

    info!(
        addr = %addr,
        tracker = %config.tracker_url,
        platform = %build_config,
        work_dir = %work_dir.display(),
        "Starting distci builder"
    );

    let shutdown = CancellationToken::new();
    let client = RpcClient::new(config.rpc_timeout())?;
    let (queue, queue_rx) = mpsc::unbounded_channel();

    let state = Arc::new(BuilderState {
        queue,
        artifacts: artifacts.clone(),
    });
    let listener = TcpListener::bind(addr).await?;
    let server = tokio::spawn(
        axum::serve(listener, http::create_router(state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );
    info!("HTTP server listening on {}", addr);

    let builder = Builder::new(
        Arc::new(GoToolchain::new(&config.go_bin)),
        client.clone(),
        artifacts,
        vec![build_config.clone()],
        &config.public_url,
        scratch,
    )
    .with_artifact_ttl(config.artifact_ttl());
    let worker = tokio::spawn(builder.run(queue_rx, shutdown.clone()));

    let registration = Registration::new(client, &config.tracker_url, ServiceKind::Builder);
    let key = tokio::select! {
        key = registration.announce(&build_config, &config.public_url, config.announce_retry(), &shutdown) => key,
        _ = tokio::signal::ctrl_c() => None,
    };

    if key.is_some() && tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received; shutting down");
    }

    shutdown.cancel();
    if let Some(key) = key {
        registration.remove(key).await;
    }

    if let Err(e) = worker.await {
        error!(error = %e, "Builder loop panicked");
    }
    match server.await {
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    info!("Builder stopped");

    Ok(())
}
