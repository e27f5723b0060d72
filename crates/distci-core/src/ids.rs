//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Store key of a Work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkKey(String);

impl WorkKey {
    /// Create a new WorkKey from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random WorkKey.
    pub fn generate() -> Self {
        Self(format!("Work:{}", Uuid::new_v4()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Deterministic identity of a Test ("WholeID"). Doubles as the dispatch ID.
///
/// Never generated randomly: see [`crate::Test::whole_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    /// Create a new TestId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TestId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Registry key handed to a Builder or Runner by `Announce`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// Create a new ServiceKey from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random ServiceKey.
    pub fn generate() -> Self {
        Self(format!("Service:{}", Uuid::new_v4()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Key of a persisted result row, scoped under its parent key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Build a child key `<parent>/<kind>:<uuid>`.
    pub fn child(parent: &str, kind: &str) -> Self {
        Self(format!("{}/{}:{}", parent, kind, Uuid::new_v4()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key was created directly under `parent`.
    pub fn is_child_of(&self, parent: &str) -> bool {
        self.0
            .strip_prefix(parent)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.contains('/'))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_key_generate() {
        let id1 = WorkKey::generate();
        let id2 = WorkKey::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("Work:"));
    }

    #[test]
    fn test_id_display() {
        let id = TestId::new("abc-123");
        assert_eq!(format!("{}", id), "abc-123");
    }

    #[test]
    fn test_record_key_parentage() {
        let work = WorkKey::new("Work:1");
        let result = RecordKey::child(work.as_str(), "WorkResult");
        let detail = RecordKey::child(result.as_str(), "TestResult");

        assert!(result.is_child_of(work.as_str()));
        assert!(detail.is_child_of(result.as_str()));
        assert!(!detail.is_child_of(work.as_str()));
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = TestId::new("deadbeef");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"deadbeef\"");
    }
}
