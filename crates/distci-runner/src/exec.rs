//! Single-shot execution of one test binary.
//!
//! Download, mark executable, run with an empty environment, post the
//! combined output. Any failure is posted as plain text to the error URL
//! instead and the process exits non-zero. There is no retry here.

use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{error, info};

use distci_rpc::RpcClient;

use crate::error::RunError;

/// Flag passed to every test binary.
pub const VERBOSE_FLAG: &str = "-test.v";

/// Where to fetch the binary and where to report.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub binary_url: String,
    pub post_url: String,
    pub error_url: String,
}

/// Run once; on failure post the error message before returning it.
pub async fn execute(client: &RpcClient, args: &RunArgs) -> Result<(), RunError> {
    let result = run(client, args).await;
    if let Err(e) = &result {
        error!(error = %e, "Run failed");
        if let Err(post_err) = client.post_text(&args.error_url, e.to_string()).await {
            error!(error = %post_err, url = %args.error_url, "Failed to post error");
        }
    }
    result
}

async fn run(client: &RpcClient, args: &RunArgs) -> Result<(), RunError> {
    let binary = fetch(client, &args.binary_url).await?;
    let output = run_binary(&binary).await?;

    client
        .post_text(&args.post_url, output)
        .await
        .map_err(RunError::Post)?;
    Ok(())
}

/// Download the binary into a private executable file.
///
/// The returned path is closed for writing and deleted on drop.
async fn fetch(client: &RpcClient, url: &str) -> Result<tempfile::TempPath, RunError> {
    let file = NamedTempFile::with_prefix("distci-test").map_err(RunError::TempFile)?;
    let path = file.into_temp_path();

    info!(url = %url, "Downloading binary");
    let bytes = client.download(url).await.map_err(RunError::Download)?;
    tokio::fs::write(&path, &bytes).await.map_err(RunError::Write)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(RunError::Chmod)?;
    }

    Ok(path)
}

/// Run the binary and return its interleaved stdout and stderr.
///
/// A non-zero exit is a test outcome, not an error.
pub async fn run_binary(path: &std::path::Path) -> Result<String, RunError> {
    let capture = NamedTempFile::with_prefix("distci-output").map_err(RunError::TempFile)?;
    let stdout = capture.as_file().try_clone().map_err(RunError::TempFile)?;
    let stderr = capture.as_file().try_clone().map_err(RunError::TempFile)?;

    let status = Command::new(path)
        .arg(VERBOSE_FLAG)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true)
        .status()
        .await
        .map_err(RunError::Exec)?;
    info!(status = %status, "Test binary exited");

    let raw = tokio::fs::read(capture.path()).await.map_err(RunError::Exec)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
