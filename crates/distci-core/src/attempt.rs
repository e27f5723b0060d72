//! The Scheduler's tracking object for one Work attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{TestId, Work, WorkKey};

/// One attempt at a Work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    /// Store key of the Work item.
    pub key: WorkKey,

    /// The requested work.
    pub work: Work,

    /// Revision of the Work document this attempt was made against.
    pub work_rev: u32,

    /// Zero-based attempt counter for the same Work revision.
    pub attempt: u32,

    /// When the Test was created.
    pub created_at: DateTime<Utc>,

    /// When the Test finished; set on the persistence path.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Test {
    /// Create a first attempt for a Work revision.
    pub fn new(key: WorkKey, work: Work, work_rev: u32) -> Self {
        Self {
            key,
            work,
            work_rev,
            attempt: 0,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Builder method to set the attempt counter.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Deterministic identity derived from content and attempt metadata.
    ///
    /// Timestamps are excluded, so equal attempts always share an ID.
    pub fn whole_id(&self) -> TestId {
        let mut hasher = Sha256::new();
        for part in [
            self.key.as_str(),
            &self.work.import_path,
            &self.work.revision,
            &self.work.vcs_hint,
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.update([self.work.subpackages as u8]);
        hasher.update(self.work_rev.to_be_bytes());
        hasher.update(self.attempt.to_be_bytes());
        TestId::new(hex::encode(hasher.finalize()))
    }

    /// Mark the attempt as finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Test {
        Test::new(WorkKey::new("Work:1"), Work::new("example.com/pkg"), 1)
    }

    #[test]
    fn test_whole_id_is_deterministic() {
        let a = sample();
        let mut b = sample();
        b.created_at = b.created_at + chrono::Duration::seconds(30);
        assert_eq!(a.whole_id(), b.whole_id());
        assert_eq!(a.whole_id().as_str().len(), 64);
    }

    #[test]
    fn test_whole_id_changes_with_attempt_metadata() {
        let base = sample();
        assert_ne!(base.whole_id(), sample().with_attempt(1).whole_id());

        let mut rev = sample();
        rev.work_rev = 2;
        assert_ne!(base.whole_id(), rev.whole_id());

        let mut sub = sample();
        sub.work = sub.work.with_subpackages();
        assert_ne!(base.whole_id(), sub.whole_id());
    }

    #[test]
    fn test_whole_id_fields_do_not_alias() {
        let a = Test::new(WorkKey::new("ab"), Work::new("c"), 1);
        let b = Test::new(WorkKey::new("a"), Work::new("bc"), 1);
        assert_ne!(a.whole_id(), b.whole_id());
    }
}
