//! External tool invocation.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::BuildError;

/// Run a tool to completion and return its combined stdout and stderr.
///
/// A non-zero exit is a [`BuildError::Command`] carrying the same output.
pub async fn run(
    program: &str,
    args: &[&str],
    dir: &Path,
    envs: &[(&str, &str)],
) -> Result<String, BuildError> {
    debug!(program, ?args, dir = %dir.display(), "Running command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let out = cmd.output().await.map_err(|source| BuildError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));

    if !out.status.success() {
        return Err(BuildError::Command {
            program: program.to_string(),
            status: out.status.to_string(),
            output: text,
        });
    }
    Ok(text)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_combines_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = run("sh", &["-c", "echo out; echo err >&2"], dir.path(), &[])
            .await
            .unwrap();
        assert_eq!(out, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_failure_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = run("sh", &["-c", "echo $MSG; exit 3"], dir.path(), &[("MSG", "broken")])
            .await
            .unwrap_err();
        match err {
            BuildError::Command { output, .. } => assert_eq!(output, "broken\n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let err = run("distci-no-such-tool", &[], dir.path(), &[]).await.unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
