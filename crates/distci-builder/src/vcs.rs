//! Repository detection and revision resolution.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use distci_core::Vcs;

use crate::command;
use crate::error::BuildError;

/// A resolved revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub id: String,
    pub date: Option<DateTime<Utc>>,
}

/// Walk up from `start` (no further than `stop`) to the repository root.
///
/// With a hint only that system's metadata directory counts; without one
/// the first match in [`Vcs::ALL`] order wins.
pub fn find_root(start: &Path, stop: &Path, hint: Option<Vcs>) -> Result<(PathBuf, Vcs), BuildError> {
    let candidates: Vec<Vcs> = match hint {
        Some(vcs) => vec![vcs],
        None => Vcs::ALL.to_vec(),
    };

    let mut dir = Some(start);
    while let Some(d) = dir {
        for vcs in &candidates {
            if d.join(vcs.metadata_dir()).is_dir() {
                return Ok((d.to_path_buf(), *vcs));
            }
        }
        if d == stop {
            break;
        }
        dir = d.parent();
    }
    Err(BuildError::NoRepository(start.to_path_buf()))
}

fn checkout_args(vcs: Vcs, revision: &str) -> Vec<&str> {
    match vcs {
        Vcs::Git => vec!["checkout", "-q", revision],
        Vcs::Hg | Vcs::Bzr => vec!["update", "-r", revision],
    }
}

/// Arguments printing `<revision id>\n<commit date>\n` for the working copy.
fn info_args(vcs: Vcs) -> &'static [&'static str] {
    match vcs {
        Vcs::Git => &["log", "-1", "--format=%H%n%cI"],
        Vcs::Hg => &["log", "-r", ".", "--template", "{node}\\n{date|rfc3339date}\\n"],
        Vcs::Bzr => &["version-info", "--custom", "--template={revision_id}\\n{date}\\n"],
    }
}

/// Parse the output of [`info_args`].
pub fn parse_info(text: &str) -> Result<Revision, BuildError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let id = lines
        .next()
        .ok_or_else(|| BuildError::RevisionInfo("empty output".into()))?
        .to_string();

    let date = match lines.next() {
        Some(raw) => Some(parse_date(raw)?),
        None => None,
    };
    Ok(Revision { id, date })
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, BuildError> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z"))
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| BuildError::RevisionInfo(format!("{raw}: {e}")))
}

/// Check out `revision` (if any) in `root` and report what is checked out.
pub async fn resolve(vcs: Vcs, root: &Path, revision: &str) -> Result<Revision, BuildError> {
    if !revision.is_empty() {
        info!(vcs = %vcs, revision, root = %root.display(), "Checking out revision");
        command::run(vcs.command(), &checkout_args(vcs, revision), root, &[]).await?;
    }

    let text = command::run(vcs.command(), info_args(vcs), root, &[]).await?;
    parse_info(&text)
}
