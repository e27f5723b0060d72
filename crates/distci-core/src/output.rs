//! Build and run outputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trailing sequence a passing `go test -v` binary prints.
pub const PASS_SENTINEL: &str = "\nPASS\n";

/// Whether captured test output counts as passing.
///
/// Only an exact `"\nPASS\n"` suffix passes; everything else (including a
/// reformatted failure or trailing whitespace) does not.
pub fn passed(output: &str) -> bool {
    output.ends_with(PASS_SENTINEL)
}

/// Target platform a binary is compiled for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildConfig {
    pub goos: String,
    pub goarch: String,
}

impl BuildConfig {
    pub fn new(goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        Self {
            goos: goos.into(),
            goarch: goarch.into(),
        }
    }

    /// Configuration matching the machine this process runs on, in Go terms.
    pub fn host() -> Self {
        let goos = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let goarch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            other => other,
        };
        Self::new(goos, goarch)
    }
}

impl fmt::Display for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.goos, self.goarch)
    }
}

/// Classification of an [`Output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    /// The binary ran; `output` holds what it printed.
    Success,
    /// The target failed to compile; `output` holds the compiler output.
    WontBuild,
    /// The Runner could not execute the binary; `output` holds the reason.
    Error,
}

/// Uniform carrier for build and run outcomes of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub import_path: String,
    pub config: BuildConfig,
    #[serde(rename = "type")]
    pub kind: OutputType,
    pub output: String,
}

impl Output {
    pub fn success(import_path: impl Into<String>, config: BuildConfig, output: impl Into<String>) -> Self {
        Self::new(import_path, config, OutputType::Success, output)
    }

    pub fn wont_build(import_path: impl Into<String>, config: BuildConfig, output: impl Into<String>) -> Self {
        Self::new(import_path, config, OutputType::WontBuild, output)
    }

    pub fn error(import_path: impl Into<String>, config: BuildConfig, output: impl Into<String>) -> Self {
        Self::new(import_path, config, OutputType::Error, output)
    }

    fn new(
        import_path: impl Into<String>,
        config: BuildConfig,
        kind: OutputType,
        output: impl Into<String>,
    ) -> Self {
        Self {
            import_path: import_path.into(),
            config,
            kind,
            output: output.into(),
        }
    }

    /// Passed flag as stored downstream; derived from the text alone.
    pub fn passed(&self) -> bool {
        passed(&self.output)
    }
}
