//! Test scheduler - admits Tests and bounds in-flight dispatches.
//!
//! Three tasks cooperate:
//! - the event loop owns mutation of the active set and consumes two
//!   streams, admissions and completions;
//! - the dispatch loop pulls admitted IDs off an unbounded queue and
//!   acquires a slot before handing each one to the [`Dispatcher`];
//! - the persistence loop saves completed Tests.
//!
//! The active set is readable concurrently through [`SchedulerHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use distci_core::{Test, TestId};

use crate::dispatch::Dispatcher;
use crate::store::Store;

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler has shut down")]
    Stopped,
}

struct Shared {
    active: RwLock<HashMap<TestId, Test>>,
    slots: Arc<Semaphore>,
    /// Slots held by dispatched Tests, released on completion.
    held: Mutex<HashMap<TestId, OwnedSemaphorePermit>>,
    capacity: usize,
}

impl Shared {
    fn held(&self) -> MutexGuard<'_, HashMap<TestId, OwnedSemaphorePermit>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hold(&self, id: TestId, permit: OwnedSemaphorePermit) {
        self.held().insert(id, permit);
    }

    fn release(&self, id: &TestId) -> bool {
        self.held().remove(id).is_some()
    }

    fn release_all(&self) {
        self.held().clear();
    }
}

/// Cheap, cloneable access to a running [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    admit_tx: mpsc::UnboundedSender<Test>,
    complete_tx: mpsc::UnboundedSender<TestId>,
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Enqueue a Test and return its identity.
    ///
    /// Returns immediately regardless of slot availability.
    pub fn schedule(&self, test: Test) -> Result<TestId, SchedulerError> {
        let id = test.whole_id();
        self.admit_tx.send(test).map_err(|_| SchedulerError::Stopped)?;
        Ok(id)
    }

    /// Signal that the attempt `id` finished (recorded, failed or abandoned).
    ///
    /// Duplicate signals are absorbed.
    pub fn complete(&self, id: &TestId) -> Result<(), SchedulerError> {
        self.complete_tx
            .send(id.clone())
            .map_err(|_| SchedulerError::Stopped)
    }

    /// Check if a Test is still active.
    pub async fn is_active(&self, id: &TestId) -> bool {
        self.shared.active.read().await.contains_key(id)
    }

    /// Get the active Test for an ID.
    pub async fn get(&self, id: &TestId) -> Option<Test> {
        self.shared.active.read().await.get(id).cloned()
    }

    /// Number of admitted, not yet completed Tests.
    pub async fn active_count(&self) -> usize {
        self.shared.active.read().await.len()
    }

    /// Number of slots currently taken.
    pub fn in_flight(&self) -> usize {
        self.shared.capacity - self.shared.slots.available_permits()
    }

    /// Maximum number of concurrently dispatched Tests.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// A running scheduler. Dropping it without [`Scheduler::shutdown`] leaves
/// its tasks running until the cancellation token fires.
pub struct Scheduler {
    handle: SchedulerHandle,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start the scheduler with `capacity` dispatch slots.
    pub fn spawn(
        capacity: usize,
        dispatcher: Arc<dyn Dispatcher>,
        store: Arc<dyn Store>,
        shutdown: CancellationToken,
    ) -> Self {
        let capacity = capacity.max(1);
        let (admit_tx, admit_rx) = mpsc::unbounded_channel();
        let (complete_tx, complete_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (save_tx, save_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            active: RwLock::new(HashMap::new()),
            slots: Arc::new(Semaphore::new(capacity)),
            held: Mutex::new(HashMap::new()),
            capacity,
        });

        let handle = SchedulerHandle {
            admit_tx,
            complete_tx,
            shared: shared.clone(),
        };

        let event_loop = EventLoop {
            shared: shared.clone(),
            dispatch_tx,
            save_tx,
        };
        let tasks = vec![
            tokio::spawn(event_loop.run(admit_rx, complete_rx, shutdown.clone())),
            tokio::spawn(dispatch_loop(
                handle.clone(),
                dispatch_rx,
                dispatcher,
                shutdown.clone(),
            )),
            tokio::spawn(persist_loop(save_rx, store)),
        ];

        info!(capacity, "Scheduler started");

        Self {
            handle,
            shutdown,
            tasks,
        }
    }

    /// Get a handle for scheduling and completing Tests.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Stop the loops, release held slots and flush pending saves.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.handle.shared.slots.close();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task panicked");
            }
        }
        self.handle.shared.release_all();
        info!("Scheduler stopped");
    }
}

struct EventLoop {
    shared: Arc<Shared>,
    dispatch_tx: mpsc::UnboundedSender<TestId>,
    save_tx: mpsc::UnboundedSender<Test>,
}

impl EventLoop {
    async fn run(
        self,
        mut admit_rx: mpsc::UnboundedReceiver<Test>,
        mut complete_rx: mpsc::UnboundedReceiver<TestId>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(id) = complete_rx.recv() => self.complete(id).await,
                Some(test) = admit_rx.recv() => self.admit(test).await,
                else => break,
            }
        }

        // Completions already queued still reach the persistence loop.
        let mut drained = 0;
        while let Ok(id) = complete_rx.try_recv() {
            self.complete(id).await;
            drained += 1;
        }
        debug!(drained, "Scheduler event loop exited");
    }

    async fn admit(&self, test: Test) {
        let id = test.whole_id();
        {
            let mut active = self.shared.active.write().await;
            if active.contains_key(&id) {
                warn!(test_id = %id, "Test already active, ignoring");
                return;
            }
            active.insert(id.clone(), test);
        }

        debug!(test_id = %id, "Test admitted");
        if self.dispatch_tx.send(id).is_err() {
            warn!("Dispatch queue closed");
        }
    }

    async fn complete(&self, id: TestId) {
        // The slot goes back even if the active-set lookup below misses.
        let released = self.shared.release(&id);

        let test = self.shared.active.write().await.remove(&id);
        match test {
            Some(test) => {
                info!(test_id = %id, released, "Test complete");
                if self.save_tx.send(test).is_err() {
                    warn!(test_id = %id, "Persistence queue closed");
                }
            }
            None => {
                debug!(test_id = %id, released, "Completion for inactive test ignored");
            }
        }
    }
}

async fn dispatch_loop(
    handle: SchedulerHandle,
    mut dispatch_rx: mpsc::UnboundedReceiver<TestId>,
    dispatcher: Arc<dyn Dispatcher>,
    shutdown: CancellationToken,
) {
    let shared = handle.shared.clone();
    loop {
        let id = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = dispatch_rx.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = shared.slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let Some(test) = handle.get(&id).await else {
            debug!(test_id = %id, "Test completed before dispatch");
            continue;
        };
        shared.hold(id.clone(), permit);

        let dispatcher = dispatcher.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&test, &id).await {
                warn!(test_id = %id, error = %e, "Dispatch abandoned");
                if let Err(e) = handle.complete(&id) {
                    warn!(test_id = %id, error = %e, "Could not signal completion");
                }
            }
        });
    }
    debug!("Scheduler dispatch loop exited");
}

async fn persist_loop(mut save_rx: mpsc::UnboundedReceiver<Test>, store: Arc<dyn Store>) {
    while let Some(mut test) = save_rx.recv().await {
        test.finish();
        if let Err(e) = store.save_test(&test).await {
            error!(test_id = %test.whole_id(), error = %e, "Failed to save test");
        }
    }
    debug!("Scheduler persistence loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use distci_core::{Work, WorkKey};
    use tokio::time::timeout;

    use crate::dispatch::DispatchError;
    use crate::store::MemoryStore;

    /// Records dispatched IDs and the peak number of held slots.
    struct RecordingDispatcher {
        dispatched: mpsc::UnboundedSender<TestId>,
        fail: bool,
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn dispatch(&self, _test: &Test, id: &TestId) -> Result<(), DispatchError> {
            let _ = self.dispatched.send(id.clone());
            if self.fail {
                return Err(DispatchError::NoBuilders);
            }
            Ok(())
        }
    }

    fn test_for(path: &str) -> Test {
        Test::new(WorkKey::new(format!("Work:{path}")), Work::new(path), 1)
    }

    fn start(
        capacity: usize,
        fail: bool,
    ) -> (Scheduler, Arc<MemoryStore>, mpsc::UnboundedReceiver<TestId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher {
            dispatched: tx,
            fail,
        });
        let scheduler = Scheduler::spawn(capacity, dispatcher, store.clone(), CancellationToken::new());
        (scheduler, store, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<TestId>) -> TestId {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for dispatch")
            .expect("dispatcher dropped")
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_third_waits_for_a_free_slot() {
        let (scheduler, _store, mut rx) = start(2, false);
        let handle = scheduler.handle();

        let a = handle.schedule(test_for("a")).unwrap();
        let b = handle.schedule(test_for("b")).unwrap();
        let c = handle.schedule(test_for("c")).unwrap();

        let first = next(&mut rx).await;
        let second = next(&mut rx).await;
        assert_eq!(handle.in_flight(), 2);
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

        handle.complete(&first).unwrap();
        let third = next(&mut rx).await;

        let mut seen = vec![first, second, third];
        seen.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        let mut want = vec![a, b, c];
        want.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(seen, want);
        assert!(handle.in_flight() <= 2);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_capacity() {
        let (scheduler, _store, mut rx) = start(3, false);
        let handle = scheduler.handle();

        for i in 0..20 {
            handle.schedule(test_for(&format!("pkg{i}"))).unwrap();
        }

        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let id = next(&mut rx).await;
            let now = handle.in_flight();
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(now <= 3, "in flight {now} > capacity");
            handle.complete(&id).unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) >= 1);
        let h = handle.clone();
        scheduler.shutdown().await;
        assert_eq!(h.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_completion_saves_once() {
        let (scheduler, store, mut rx) = start(1, false);
        let handle = scheduler.handle();

        let id = handle.schedule(test_for("a")).unwrap();
        assert_eq!(next(&mut rx).await, id);
        assert_eq!(handle.in_flight(), 1);

        handle.complete(&id).unwrap();
        handle.complete(&id).unwrap();

        let h = handle.clone();
        wait_for(move || h.in_flight() == 0).await;
        scheduler.shutdown().await;

        let saved = store.saved_tests().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].whole_id(), id);
        assert!(saved[0].finished_at.is_some());
        assert_eq!(handle.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_completion_does_not_over_release() {
        let (scheduler, _store, mut rx) = start(1, false);
        let handle = scheduler.handle();

        let a = handle.schedule(test_for("a")).unwrap();
        assert_eq!(next(&mut rx).await, a);
        handle.complete(&a).unwrap();
        handle.complete(&a).unwrap();

        // Two more: with one slot only one may be in flight.
        handle.schedule(test_for("b")).unwrap();
        handle.schedule(test_for("c")).unwrap();
        next(&mut rx).await;
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
        assert_eq!(handle.in_flight(), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_readmitting_active_id_is_ignored() {
        let (scheduler, _store, mut rx) = start(4, false);
        let handle = scheduler.handle();

        let id = handle.schedule(test_for("a")).unwrap();
        assert_eq!(handle.schedule(test_for("a")).unwrap(), id);

        next(&mut rx).await;
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
        assert_eq!(handle.active_count().await, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_abandoned_dispatch_frees_its_slot() {
        let (scheduler, store, mut rx) = start(1, true);
        let handle = scheduler.handle();

        handle.schedule(test_for("a")).unwrap();
        handle.schedule(test_for("b")).unwrap();
        next(&mut rx).await;
        next(&mut rx).await;

        let h = handle.clone();
        wait_for(move || h.in_flight() == 0).await;
        scheduler.shutdown().await;
        assert_eq!(store.saved_tests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_saves_queued_completions() {
        let (scheduler, store, mut rx) = start(4, false);
        let handle = scheduler.handle();

        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(handle.schedule(test_for(&format!("pkg{i}"))).unwrap());
        }
        for _ in 0..4 {
            next(&mut rx).await;
        }

        for id in &ids {
            handle.complete(id).unwrap();
        }
        scheduler.shutdown().await;

        assert_eq!(store.saved_tests().await.len(), 4);
        assert_eq!(handle.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_schedule_after_shutdown_fails() {
        let (scheduler, _store, _rx) = start(1, false);
        let handle = scheduler.handle();
        scheduler.shutdown().await;

        let result = handle.schedule(test_for("a"));
        assert!(matches!(result, Err(SchedulerError::Stopped)));
    }
}
