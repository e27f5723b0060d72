//! distci Runner
//!
//! `distci-runner <binary url> <post url> <error url>`: runs one test
//! binary and reports its output, then exits.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use distci_rpc::RpcClient;
use distci_runner::exec::{self, RunArgs};

/// Run one test binary and post its output.
#[derive(Parser, Debug)]
#[command(name = "distci-runner")]
struct Args {
    /// URL to download the test binary from
    binary_url: String,

    /// URL to post the output to
    post_url: String,

    /// URL to post errors to
    error_url: String,
}

const USAGE: &str = "usage: distci-runner <url to binary> <url to post response> <url to post error>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Ok(args) = Args::try_parse() else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let client = RpcClient::new(Duration::from_secs(120))?;
    let args = RunArgs {
        binary_url: args.binary_url,
        post_url: args.post_url,
        error_url: args.error_url,
    };

    if exec::execute(&client, &args).await.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
