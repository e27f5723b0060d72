//! Shared application state.

use std::sync::Arc;

use crate::config::Config;
use crate::reconciler::Reconciler;
use crate::scheduler::SchedulerHandle;
use crate::store::Store;

/// Shared application state.
pub struct AppState {
    pub config: Config,

    /// Durable records and the service registry.
    pub store: Arc<dyn Store>,

    /// Admission and completion of Tests.
    pub scheduler: SchedulerHandle,

    /// Single writer of results.
    pub reconciler: Reconciler,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(config: Config, store: Arc<dyn Store>, scheduler: SchedulerHandle) -> Arc<Self> {
        let reconciler = Reconciler::new(store.clone(), scheduler.clone());
        Arc::new(Self {
            config,
            store,
            scheduler,
            reconciler,
        })
    }
}
