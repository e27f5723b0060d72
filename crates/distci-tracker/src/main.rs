//! distci Tracker Server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use distci_tracker::{Config, MemoryStore, Tracker};

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

    info!(
        addr = %addr,
        public_url = %config.public_url,
        slots = config.slots,
        "Starting distci tracker"
    );

    let shutdown = CancellationToken::new();
    let tracker = Tracker::start(config, Arc::new(MemoryStore::new()), shutdown.clone())?;

    let listener = TcpListener::bind(addr).await?;
    let server = tokio::spawn(
        axum::serve(listener, tracker.router())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    info!("HTTP server listening on {}", addr);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received; shutting down");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
    match server.await {
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    tracker.shutdown().await;
    info!("Tracker stopped");

    Ok(())
}
