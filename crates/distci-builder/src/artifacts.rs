//! Compiled binaries served to runners.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};

use distci_core::{BuildConfig, TestId};

/// Hex digits of a digest kept in artifact names.
const TAG_LEN: usize = 16;

/// Directory of compiled test binaries, addressed by flat file names.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for one target of one dispatch.
    ///
    /// `<id tag>-<readable path>-<path tag>-<goos>_<goarch>.test`. The
    /// readable part is lossy; the path tag keeps names of distinct import
    /// paths apart.
    pub fn name_for(id: &TestId, import_path: &str, config: &BuildConfig) -> String {
        let readable: String = import_path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!(
            "{}-{}-{}-{}_{}.test",
            Self::tag(id),
            readable,
            digest(import_path),
            config.goos,
            config.goarch
        )
    }

    /// Name prefix shared by every artifact of `id`.
    pub fn tag(id: &TestId) -> String {
        digest(id.as_str())
    }

    /// Path for `name`, or `None` if it could escape the directory.
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        let flat = !name.is_empty()
            && !name.starts_with('.')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c));
        flat.then(|| self.dir.join(name))
    }

    /// Delete every artifact produced for `id`.
    pub async fn purge(&self, id: &TestId) -> std::io::Result<usize> {
        let prefix = format!("{}-", Self::tag(id));
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete artifacts last modified at least `max_age` ago.
    pub async fn sweep(&self, max_age: Duration) -> std::io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn digest(s: &str) -> String {
    let mut hex = hex::encode(Sha256::digest(s.as_bytes()));
    hex.truncate(TAG_LEN);
    hex
}
