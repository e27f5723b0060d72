//! distci Tracker Library
//!
//! The Tracker admits Tests, bounds how many are dispatched at once, and
//! records the outcome of each dispatch exactly once.

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;

use distci_rpc::{ClientError, RpcClient};

pub mod config;
pub mod dispatch;
pub mod http;
pub mod metrics;
pub mod reconciler;
pub mod scheduler;
pub mod state;
pub mod store;

pub use config::Config;
pub use dispatch::{DispatchError, Dispatcher, HttpDispatcher};
pub use reconciler::{Outcome, ReconcileError, Reconciler};
pub use scheduler::{Scheduler, SchedulerError, SchedulerHandle};
pub use state::AppState;
pub use store::{MemoryStore, Store, StoreError};

/// A running tracker: scheduler loops plus the state its router serves.
pub struct Tracker {
    state: Arc<AppState>,
    scheduler: Scheduler,
}

impl Tracker {
    /// Start a tracker that dispatches to registered Builders over HTTP.
    pub fn start(
        config: Config,
        store: Arc<dyn Store>,
        shutdown: CancellationToken,
    ) -> Result<Self, ClientError> {
        let client = RpcClient::new(config.rpc_timeout())?;
        let dispatcher = Arc::new(HttpDispatcher::new(
            store.clone(),
            client,
            config.response_url(),
            config.dispatch_attempts,
            config.dispatch_backoff(),
        ));
        Ok(Self::with_dispatcher(config, store, dispatcher, shutdown))
    }

    /// Start a tracker with a custom dispatcher.
    pub fn with_dispatcher(
        config: Config,
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        let scheduler = Scheduler::spawn(config.slots, dispatcher, store.clone(), shutdown);
        let state = AppState::new(config, store, scheduler.handle());
        Self { state, scheduler }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        http::create_router(self.state.clone())
    }

    /// Stop the scheduler and flush pending saves.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
    }
}
