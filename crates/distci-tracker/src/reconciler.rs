//! Response reconciliation - records Runner/Builder outcomes exactly once.
//!
//! Every inbound response first consumes the TaskInfo for its dispatch ID.
//! Only the caller that consumed it writes records; everybody else got a
//! late or duplicate response and is dropped with a log line.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use distci_core::{BuildFailure, Output, TaskInfo, TestId, TestResult, WorkKey, WorkResult};
use distci_rpc::{BuilderResponse, DispatchResponse, RunnerResponse};

use crate::scheduler::SchedulerHandle;
use crate::store::{Store, StoreError};

/// Reconciliation errors. Only storage failures surface.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

/// What happened to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Records were written for this response.
    Recorded,
    /// The TaskInfo was already gone; nothing was written.
    Late,
}

/// The Tracker's single authority for durable results.
pub struct Reconciler {
    store: Arc<dyn Store>,
    scheduler: SchedulerHandle,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, scheduler: SchedulerHandle) -> Self {
        Self { store, scheduler }
    }

    /// Record a Runner's outputs: one WorkResult plus one TestResult each.
    pub async fn post(&self, resp: RunnerResponse) -> Result<Outcome, ReconcileError> {
        info!(test_id = %resp.id, outputs = resp.tests.len(), "Storing runner result");

        let Some(info) = self.claim(&resp.id, &resp.key, resp.work_rev).await? else {
            return Ok(Outcome::Late);
        };

        let result = self.record_run(&info, &resp).await;
        self.complete(&info.id);
        result.map(|_| Outcome::Recorded)
    }

    /// Record a Builder failure: one failed WorkResult plus one
    /// BuildFailure per build error.
    pub async fn error(&self, resp: BuilderResponse) -> Result<Outcome, ReconcileError> {
        info!(test_id = %resp.id, error = %resp.error, "Storing builder error");

        let Some(info) = self.claim(&resp.id, &resp.key, resp.work_rev).await? else {
            return Ok(Outcome::Late);
        };

        let result = self
            .record_failure(
                &info,
                &resp.error,
                &resp.revision,
                resp.rev_date,
                &resp.build_errors,
            )
            .await;
        self.complete(&info.id);
        result.map(|_| Outcome::Recorded)
    }

    /// Record a dispatch that ran out of retries, like a Builder failure
    /// without revision or build errors.
    pub async fn dispatch_failed(&self, resp: DispatchResponse) -> Result<Outcome, ReconcileError> {
        info!(test_id = %resp.id, error = %resp.error, "Storing dispatch failure");

        let Some(info) = self.claim(&resp.id, &resp.key, resp.work_rev).await? else {
            return Ok(Outcome::Late);
        };

        let result = self.record_failure(&info, &resp.error, "", None, &[]).await;
        self.complete(&info.id);
        result.map(|_| Outcome::Recorded)
    }

    /// Consume the TaskInfo for `id`; `None` for a late/duplicate response.
    async fn claim(
        &self,
        id: &TestId,
        key: &WorkKey,
        work_rev: u32,
    ) -> Result<Option<TaskInfo>, ReconcileError> {
        let Some(info) = self.store.consume_task_info(id).await? else {
            warn!(test_id = %id, "Got a late response");
            return Ok(None);
        };

        if !info.matches(key, work_rev) {
            warn!(
                test_id = %id,
                expected_key = %info.key,
                expected_rev = info.work_rev,
                got_key = %key,
                got_rev = work_rev,
                "Response routing data disagrees with dispatch, using dispatch"
            );
        }
        Ok(Some(info))
    }

    async fn record_run(&self, info: &TaskInfo, resp: &RunnerResponse) -> Result<(), ReconcileError> {
        let wkey = self
            .store
            .put_work_result(&info.key, &WorkResult::succeeded())
            .await?;

        for out in &resp.tests {
            let row = TestResult::from_output(out, &resp.revision, resp.rev_date);
            self.store.put_test_result(&wkey, &row).await?;
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        info: &TaskInfo,
        error: &str,
        revision: &str,
        rev_date: Option<DateTime<Utc>>,
        build_errors: &[Output],
    ) -> Result<(), ReconcileError> {
        let wkey = self
            .store
            .put_work_result(&info.key, &WorkResult::failed(error))
            .await?;

        for out in build_errors {
            let row = BuildFailure::from_output(out, revision, rev_date);
            self.store.put_build_failure(&wkey, &row).await?;
        }
        Ok(())
    }

    fn complete(&self, id: &TestId) {
        if let Err(e) = self.scheduler.complete(id) {
            warn!(test_id = %id, error = %e, "Could not signal completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use distci_core::{
        BuildConfig, RecordKey, ServiceInfo, ServiceKey, ServiceKind, Test, Work,
    };
    use tokio_util::sync::CancellationToken;

    use crate::dispatch::{DispatchError, Dispatcher};
    use crate::scheduler::Scheduler;
    use crate::store::MemoryStore;

    struct NoopDispatcher;

    #[async_trait]
    impl Dispatcher for NoopDispatcher {
        async fn dispatch(&self, _test: &Test, _id: &TestId) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    /// Delegates to a MemoryStore, failing detail writes after `budget`.
    struct FlakyStore {
        inner: MemoryStore,
        budget: AtomicUsize,
    }

    impl FlakyStore {
        fn spend(&self) -> Result<(), StoreError> {
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(StoreError::Unavailable("write quota exceeded".into()));
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn create_work(&self, work: &Work) -> Result<WorkKey, StoreError> {
            self.inner.create_work(work).await
        }
        async fn find_work(&self, key: &WorkKey) -> Result<Option<Work>, StoreError> {
            self.inner.find_work(key).await
        }
        async fn create_task_info(&self, info: TaskInfo) -> Result<(), StoreError> {
            self.inner.create_task_info(info).await
        }
        async fn consume_task_info(&self, id: &TestId) -> Result<Option<TaskInfo>, StoreError> {
            self.inner.consume_task_info(id).await
        }
        async fn put_work_result(&self, parent: &WorkKey, result: &WorkResult) -> Result<RecordKey, StoreError> {
            self.inner.put_work_result(parent, result).await
        }
        async fn put_test_result(&self, parent: &RecordKey, result: &TestResult) -> Result<RecordKey, StoreError> {
            self.spend()?;
            self.inner.put_test_result(parent, result).await
        }
        async fn put_build_failure(&self, parent: &RecordKey, failure: &BuildFailure) -> Result<RecordKey, StoreError> {
            self.spend()?;
            self.inner.put_build_failure(parent, failure).await
        }
        async fn find_work_results(&self, parent: &WorkKey) -> Result<Vec<(RecordKey, WorkResult)>, StoreError> {
            self.inner.find_work_results(parent).await
        }
        async fn find_test_results(&self, parent: &RecordKey) -> Result<Vec<TestResult>, StoreError> {
            self.inner.find_test_results(parent).await
        }
        async fn find_build_failures(&self, parent: &RecordKey) -> Result<Vec<BuildFailure>, StoreError> {
            self.inner.find_build_failures(parent).await
        }
        async fn save_test(&self, test: &Test) -> Result<(), StoreError> {
            self.inner.save_test(test).await
        }
        async fn put_service(&self, service: ServiceInfo) -> Result<(), StoreError> {
            self.inner.put_service(service).await
        }
        async fn remove_service(&self, key: &ServiceKey) -> Result<bool, StoreError> {
            self.inner.remove_service(key).await
        }
        async fn find_services(&self, kind: ServiceKind) -> Result<Vec<ServiceInfo>, StoreError> {
            self.inner.find_services(kind).await
        }
    }

    struct Fixture {
        store: Arc<dyn Store>,
        reconciler: Arc<Reconciler>,
        scheduler: Scheduler,
        key: WorkKey,
        id: TestId,
    }

    /// A Work item that has been scheduled and dispatched.
    async fn fixture_with(store: Arc<dyn Store>) -> Fixture {
        let scheduler = Scheduler::spawn(2, Arc::new(NoopDispatcher), store.clone(), CancellationToken::new());
        let key = store.create_work(&Work::new("example.com/pkg")).await.unwrap();
        let test = Test::new(key.clone(), Work::new("example.com/pkg"), 1);
        let handle = scheduler.handle();
        let id = handle.schedule(test).unwrap();
        while !handle.is_active(&id).await {
            tokio::task::yield_now().await;
        }
        store
            .create_task_info(TaskInfo::new(id.clone(), key.clone(), 1))
            .await
            .unwrap();
        let reconciler = Arc::new(Reconciler::new(store.clone(), scheduler.handle()));
        Fixture {
            store,
            reconciler,
            scheduler,
            key,
            id,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStore::new())).await
    }

    fn cfg() -> BuildConfig {
        BuildConfig::new("linux", "amd64")
    }

    fn runner_response(f: &Fixture, outputs: Vec<Output>) -> RunnerResponse {
        RunnerResponse {
            key: f.key.clone(),
            id: f.id.clone(),
            work_rev: 1,
            revision: "abc123".into(),
            rev_date: None,
            tests: outputs,
        }
    }

    fn builder_response(f: &Fixture, error: &str, build_errors: Vec<Output>) -> BuilderResponse {
        BuilderResponse {
            key: f.key.clone(),
            id: f.id.clone(),
            work_rev: 1,
            error: error.into(),
            revision: String::new(),
            rev_date: None,
            build_errors,
        }
    }

    async fn results(f: &Fixture) -> Vec<(RecordKey, WorkResult)> {
        f.store.find_work_results(&f.key).await.unwrap()
    }

    #[tokio::test]
    async fn test_passing_run_is_recorded_once() {
        let f = fixture().await;
        let resp = runner_response(&f, vec![Output::success("example.com/pkg", cfg(), "ok\nPASS\n")]);

        assert_eq!(f.reconciler.post(resp.clone()).await.unwrap(), Outcome::Recorded);

        let found = results(&f).await;
        assert_eq!(found.len(), 1);
        assert!(found[0].1.success);
        let tests = f.store.find_test_results(&found[0].0).await.unwrap();
        assert_eq!(tests.len(), 1);
        assert!(tests[0].passed);
        assert_eq!(tests[0].revision, "abc123");
        assert!(f.store.find_build_failures(&found[0].0).await.unwrap().is_empty());

        // The same response again is late.
        assert_eq!(f.reconciler.post(resp).await.unwrap(), Outcome::Late);
        assert_eq!(results(&f).await.len(), 1);

        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_pass_flag_comes_from_output_text() {
        let f = fixture().await;
        let resp = runner_response(
            &f,
            vec![
                Output::success("a", cfg(), "--- FAIL: TestX\nFAIL\n"),
                Output::error("b", cfg(), "weird\nPASS\n"),
                Output::wont_build("c", cfg(), "syntax error"),
            ],
        );
        f.reconciler.post(resp).await.unwrap();

        let found = results(&f).await;
        let tests = f.store.find_test_results(&found[0].0).await.unwrap();
        let passed: Vec<bool> = tests.iter().map(|t| t.passed).collect();
        assert_eq!(passed, vec![false, true, false]);

        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_record_once() {
        let f = fixture().await;
        let resp = runner_response(&f, vec![Output::success("a", cfg(), "PASS\n")]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reconciler = f.reconciler.clone();
            let resp = resp.clone();
            handles.push(tokio::spawn(async move { reconciler.post(resp).await.unwrap() }));
        }
        let mut recorded = 0;
        for h in handles {
            if h.await.unwrap() == Outcome::Recorded {
                recorded += 1;
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(results(&f).await.len(), 1);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_runner_and_builder_race_records_one_kind() {
        let f = fixture().await;
        let run = runner_response(&f, vec![Output::success("a", cfg(), "PASS\n")]);
        let build = builder_response(&f, "boom", vec![Output::wont_build("a", cfg(), "bad")]);

        let (a, b) = tokio::join!(f.reconciler.post(run), f.reconciler.error(build));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Recorded).count(), 1);

        let found = results(&f).await;
        assert_eq!(found.len(), 1);
        let tests = f.store.find_test_results(&found[0].0).await.unwrap();
        let failures = f.store.find_build_failures(&found[0].0).await.unwrap();
        if found[0].1.success {
            assert_eq!((tests.len(), failures.len()), (1, 0));
        } else {
            assert_eq!((tests.len(), failures.len()), (0, 1));
        }
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_unresolvable_revision_records_bare_failure() {
        let f = fixture().await;
        let resp = builder_response(&f, "unknown revision deadbeef", vec![]);

        assert_eq!(f.reconciler.error(resp).await.unwrap(), Outcome::Recorded);

        let found = results(&f).await;
        assert_eq!(found.len(), 1);
        assert!(!found[0].1.success);
        assert_eq!(found[0].1.error, "unknown revision deadbeef");
        assert!(f.store.find_test_results(&found[0].0).await.unwrap().is_empty());
        assert!(f.store.find_build_failures(&found[0].0).await.unwrap().is_empty());
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_errors_become_build_failures_only() {
        let f = fixture().await;
        let resp = builder_response(
            &f,
            "no targets built",
            vec![
                Output::wont_build("a", cfg(), "a.go:1: syntax error"),
                Output::wont_build("a/b", cfg(), "b.go:2: undefined: x"),
            ],
        );
        f.reconciler.error(resp).await.unwrap();

        let found = results(&f).await;
        let failures = f.store.find_build_failures(&found[0].0).await.unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[1].output, "b.go:2: undefined: x");
        assert!(f.store.find_test_results(&found[0].0).await.unwrap().is_empty());
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_response_writes_nothing() {
        let f = fixture().await;
        f.store.consume_task_info(&f.id).await.unwrap();

        let resp = runner_response(&f, vec![Output::success("a", cfg(), "PASS\n")]);
        assert_eq!(f.reconciler.post(resp).await.unwrap(), Outcome::Late);
        assert!(results(&f).await.is_empty());

        // Late responses do not complete the Test either.
        assert!(f.scheduler.handle().is_active(&f.id).await);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_recorded_like_builder_failure() {
        let f = fixture().await;
        let resp = DispatchResponse {
            key: f.key.clone(),
            id: f.id.clone(),
            error: "no builders".into(),
            work_rev: 1,
        };
        assert_eq!(f.reconciler.dispatch_failed(resp).await.unwrap(), Outcome::Recorded);

        let found = results(&f).await;
        assert_eq!(found.len(), 1);
        assert!(!found[0].1.success);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_partial_result() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            budget: AtomicUsize::new(1),
        });
        let f = fixture_with(store).await;
        let resp = runner_response(
            &f,
            vec![
                Output::success("a", cfg(), "PASS\n"),
                Output::success("b", cfg(), "PASS\n"),
                Output::success("c", cfg(), "PASS\n"),
            ],
        );

        let err = f.reconciler.post(resp.clone()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Store(StoreError::Unavailable(_))));

        // WorkResult and the first detail row survive.
        let found = results(&f).await;
        assert_eq!(found.len(), 1);
        assert_eq!(f.store.find_test_results(&found[0].0).await.unwrap().len(), 1);

        // The TaskInfo was consumed, so a retry is late.
        assert_eq!(f.reconciler.post(resp).await.unwrap(), Outcome::Late);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_recording_completes_the_test() {
        let f = fixture().await;
        let handle = f.scheduler.handle();
        assert!(handle.is_active(&f.id).await);

        let resp = runner_response(&f, vec![]);
        f.reconciler.post(resp).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while handle.is_active(&f.id).await {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        f.scheduler.shutdown().await;
    }
}
