//! Go toolchain driver.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use distci_core::{BuildConfig, Work};

use crate::command;
use crate::error::BuildError;
use crate::vcs::{self, Revision};

/// Steps the builder needs from a toolchain, all run inside a private
/// workspace directory.
#[async_trait]
pub trait Toolchain: Send + Sync + 'static {
    /// Fetch the sources for `work` and check out its revision.
    async fn resolve(&self, work: &Work, workspace: &Path) -> Result<Revision, BuildError>;

    /// Import paths with tests to build for `work`.
    async fn targets(&self, work: &Work, workspace: &Path) -> Result<Vec<String>, BuildError>;

    /// Compile the test binary for one target into `out`.
    ///
    /// `Ok(false)` means the package has no tests and nothing was written.
    async fn compile(
        &self,
        import_path: &str,
        config: &BuildConfig,
        workspace: &Path,
        out: &Path,
    ) -> Result<bool, BuildError>;
}

/// [`Toolchain`] backed by the `go` command in GOPATH mode.
pub struct GoToolchain {
    go_bin: String,
}

impl GoToolchain {
    pub fn new(go_bin: impl Into<String>) -> Self {
        Self {
            go_bin: go_bin.into(),
        }
    }

    async fn go(&self, args: &[&str], workspace: &Path, extra: &[(&str, &str)]) -> Result<String, BuildError> {
        let gopath = workspace.to_string_lossy();
        let mut envs = vec![("GOPATH", gopath.as_ref()), ("GO111MODULE", "off")];
        envs.extend_from_slice(extra);
        command::run(&self.go_bin, args, workspace, &envs).await
    }
}

fn pattern(work: &Work) -> String {
    if work.subpackages {
        format!("{}/...", work.import_path)
    } else {
        work.import_path.clone()
    }
}

#[async_trait]
impl Toolchain for GoToolchain {
    async fn resolve(&self, work: &Work, workspace: &Path) -> Result<Revision, BuildError> {
        let hint = work.vcs()?;
        let pattern = pattern(work);

        info!(pattern = %pattern, "Fetching sources");
        self.go(&["get", "-d", &pattern], workspace, &[]).await?;

        let src = workspace.join("src");
        let (root, vcs) = vcs::find_root(&src.join(&work.import_path), &src, hint)?;
        debug!(root = %root.display(), vcs = %vcs, "Found repository");

        vcs::resolve(vcs, &root, &work.revision).await
    }

    async fn targets(&self, work: &Work, workspace: &Path) -> Result<Vec<String>, BuildError> {
        if !work.subpackages {
            return Ok(vec![work.import_path.clone()]);
        }

        let listed = self.go(&["list", &pattern(work)], workspace, &[]).await?;
        Ok(listed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn compile(
        &self,
        import_path: &str,
        config: &BuildConfig,
        workspace: &Path,
        out: &Path,
    ) -> Result<bool, BuildError> {
        // A leftover binary would pass the existence check below.
        match tokio::fs::remove_file(out).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let out_str = out.to_string_lossy();
        let envs = [("GOOS", config.goos.as_str()), ("GOARCH", config.goarch.as_str())];
        self.go(&["test", "-c", "-o", &out_str, import_path], workspace, &envs)
            .await?;
        Ok(tokio::fs::try_exists(out).await?)
    }
}
