//! Persistence contract consumed by the Tracker.
//!
//! The real engine is external; the Tracker only relies on create/find/put
//! calls that are atomic per call. [`MemoryStore`] is the in-process engine
//! used by the binary and the tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use distci_core::{
    BuildFailure, RecordKey, ServiceInfo, ServiceKey, ServiceKind, TaskInfo, Test, TestId,
    TestResult, Work, WorkKey, WorkResult,
};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record already exists: {0}")]
    Conflict(String),
}

/// Create/find/put operations the Tracker performs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store a new Work item and return its key.
    async fn create_work(&self, work: &Work) -> Result<WorkKey, StoreError>;

    async fn find_work(&self, key: &WorkKey) -> Result<Option<Work>, StoreError>;

    /// Create the TaskInfo for a dispatch. Fails with `Conflict` if one
    /// exists or ever existed for the same ID.
    async fn create_task_info(&self, info: TaskInfo) -> Result<(), StoreError>;

    /// Atomically find and delete the TaskInfo for `id`.
    ///
    /// Exactly one of any number of concurrent callers gets `Some`.
    async fn consume_task_info(&self, id: &TestId) -> Result<Option<TaskInfo>, StoreError>;

    async fn put_work_result(&self, parent: &WorkKey, result: &WorkResult) -> Result<RecordKey, StoreError>;

    async fn put_test_result(&self, parent: &RecordKey, result: &TestResult) -> Result<RecordKey, StoreError>;

    async fn put_build_failure(&self, parent: &RecordKey, failure: &BuildFailure) -> Result<RecordKey, StoreError>;

    async fn find_work_results(&self, parent: &WorkKey) -> Result<Vec<(RecordKey, WorkResult)>, StoreError>;

    async fn find_test_results(&self, parent: &RecordKey) -> Result<Vec<TestResult>, StoreError>;

    async fn find_build_failures(&self, parent: &RecordKey) -> Result<Vec<BuildFailure>, StoreError>;

    /// Persist a finished Test.
    async fn save_test(&self, test: &Test) -> Result<(), StoreError>;

    /// Register a service under a fresh key.
    async fn put_service(&self, service: ServiceInfo) -> Result<(), StoreError>;

    /// Deregister a service. Returns false if it was not registered.
    async fn remove_service(&self, key: &ServiceKey) -> Result<bool, StoreError>;

    async fn find_services(&self, kind: ServiceKind) -> Result<Vec<ServiceInfo>, StoreError>;
}

#[derive(Default)]
struct Tables {
    works: HashMap<WorkKey, Work>,
    task_infos: HashMap<TestId, TaskInfo>,
    consumed: HashSet<TestId>,
    work_results: Vec<(WorkKey, RecordKey, WorkResult)>,
    test_results: Vec<(RecordKey, TestResult)>,
    build_failures: Vec<(RecordKey, BuildFailure)>,
    saved_tests: Vec<Test>,
    services: HashMap<ServiceKey, ServiceInfo>,
}

/// In-memory store. Every call holds the table lock for its whole duration.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `save_test` call so far, in order.
    pub async fn saved_tests(&self) -> Vec<Test> {
        self.tables.read().await.saved_tests.clone()
    }

    /// Number of live TaskInfo records.
    pub async fn pending_task_infos(&self) -> usize {
        self.tables.read().await.task_infos.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_work(&self, work: &Work) -> Result<WorkKey, StoreError> {
        let key = WorkKey::generate();
        self.tables.write().await.works.insert(key.clone(), work.clone());
        Ok(key)
    }

    async fn find_work(&self, key: &WorkKey) -> Result<Option<Work>, StoreError> {
        Ok(self.tables.read().await.works.get(key).cloned())
    }

    async fn create_task_info(&self, info: TaskInfo) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.consumed.contains(&info.id) || tables.task_infos.contains_key(&info.id) {
            return Err(StoreError::Conflict(format!("TaskInfo {}", info.id)));
        }
        tables.task_infos.insert(info.id.clone(), info);
        Ok(())
    }

    async fn consume_task_info(&self, id: &TestId) -> Result<Option<TaskInfo>, StoreError> {
        let mut tables = self.tables.write().await;
        let info = tables.task_infos.remove(id);
        if info.is_some() {
            tables.consumed.insert(id.clone());
        }
        Ok(info)
    }

    async fn put_work_result(&self, parent: &WorkKey, result: &WorkResult) -> Result<RecordKey, StoreError> {
        let key = RecordKey::child(parent.as_str(), "WorkResult");
        self.tables
            .write()
            .await
            .work_results
            .push((parent.clone(), key.clone(), result.clone()));
        Ok(key)
    }

    async fn put_test_result(&self, parent: &RecordKey, result: &TestResult) -> Result<RecordKey, StoreError> {
        let key = RecordKey::child(parent.as_str(), "TestResult");
        self.tables
            .write()
            .await
            .test_results
            .push((parent.clone(), result.clone()));
        Ok(key)
    }

    async fn put_build_failure(&self, parent: &RecordKey, failure: &BuildFailure) -> Result<RecordKey, StoreError> {
        let key = RecordKey::child(parent.as_str(), "BuildFailure");
        self.tables
            .write()
            .await
            .build_failures
            .push((parent.clone(), failure.clone()));
        Ok(key)
    }

    async fn find_work_results(&self, parent: &WorkKey) -> Result<Vec<(RecordKey, WorkResult)>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .work_results
            .iter()
            .filter(|(p, _, _)| p == parent)
            .map(|(_, k, r)| (k.clone(), r.clone()))
            .collect())
    }

    async fn find_test_results(&self, parent: &RecordKey) -> Result<Vec<TestResult>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .test_results
            .iter()
            .filter(|(p, _)| p == parent)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn find_build_failures(&self, parent: &RecordKey) -> Result<Vec<BuildFailure>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .build_failures
            .iter()
            .filter(|(p, _)| p == parent)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn save_test(&self, test: &Test) -> Result<(), StoreError> {
        self.tables.write().await.saved_tests.push(test.clone());
        Ok(())
    }

    async fn put_service(&self, service: ServiceInfo) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .services
            .insert(service.key.clone(), service);
        Ok(())
    }

    async fn remove_service(&self, key: &ServiceKey) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.services.remove(key).is_some())
    }

    async fn find_services(&self, kind: ServiceKind) -> Result<Vec<ServiceInfo>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .services
            .values()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect())
    }
}
