//! Work requests and version-control hints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// A request to build and test an import path at a revision.
///
/// An empty `revision` means whatever `go get` fetches. When `subpackages`
/// is set every package below the import path is built as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Work {
    /// Revision to test; empty for the fetched head.
    #[serde(default)]
    pub revision: String,

    /// Import path of the package under test.
    pub import_path: String,

    /// Build every package below `import_path` too.
    #[serde(default)]
    pub subpackages: bool,

    /// Version control system name; empty to detect from the checkout.
    #[serde(default)]
    pub vcs_hint: String,
}

impl Work {
    /// Create a new Work for an import path at the fetched head.
    pub fn new(import_path: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            ..Self::default()
        }
    }

    /// Builder method to pin a revision.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Builder method to include subpackages.
    pub fn with_subpackages(mut self) -> Self {
        self.subpackages = true;
        self
    }

    /// Builder method to set the VCS hint.
    pub fn with_vcs_hint(mut self, hint: impl Into<String>) -> Self {
        self.vcs_hint = hint.into();
        self
    }

    /// The hinted VCS, or `None` when it must be detected.
    pub fn vcs(&self) -> Result<Option<Vcs>, CoreError> {
        if self.vcs_hint.is_empty() {
            return Ok(None);
        }
        self.vcs_hint.parse().map(Some)
    }

    /// Reject work that cannot be built at all.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.import_path.trim().is_empty() {
            return Err(CoreError::InvalidInput("import path is empty".into()));
        }
        self.vcs()?;
        Ok(())
    }
}

/// Supported version control systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vcs {
    Git,
    Hg,
    Bzr,
}

impl Vcs {
    /// Detection order when no hint is given.
    pub const ALL: [Vcs; 3] = [Vcs::Git, Vcs::Hg, Vcs::Bzr];

    /// Command name of the tool.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Bzr => "bzr",
        }
    }

    /// Metadata directory marking a repository root.
    pub fn metadata_dir(&self) -> &'static str {
        match self {
            Self::Git => ".git",
            Self::Hg => ".hg",
            Self::Bzr => ".bzr",
        }
    }
}

impl fmt::Display for Vcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl FromStr for Vcs {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "hg" | "mercurial" => Ok(Self::Hg),
            "bzr" | "bazaar" => Ok(Self::Bzr),
            other => Err(CoreError::UnknownVcs(other.to_string())),
        }
    }
}
