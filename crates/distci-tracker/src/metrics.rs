//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use tracing::warn;

use distci_core::ServiceKind;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_scheduler_metrics(state, &mut output).await;
    collect_service_metrics(state, &mut output).await;

    output
}

/// Active Tests and slot usage.
async fn collect_scheduler_metrics(state: &Arc<AppState>, output: &mut String) {
    let scheduler = &state.scheduler;
    let active = scheduler.active_count().await;

    writeln!(output, "# HELP distci_tests_active Tests admitted and not yet completed").ok();
    writeln!(output, "# TYPE distci_tests_active gauge").ok();
    writeln!(output, "distci_tests_active {active}").ok();

    writeln!(output).ok();
    writeln!(output, "# HELP distci_slots_in_flight Dispatch slots currently held").ok();
    writeln!(output, "# TYPE distci_slots_in_flight gauge").ok();
    writeln!(output, "distci_slots_in_flight {}", scheduler.in_flight()).ok();

    writeln!(output).ok();
    writeln!(output, "# HELP distci_slots_capacity Maximum concurrently dispatched tests").ok();
    writeln!(output, "# TYPE distci_slots_capacity gauge").ok();
    writeln!(output, "distci_slots_capacity {}", scheduler.capacity()).ok();
}

/// Registered services by kind.
async fn collect_service_metrics(state: &Arc<AppState>, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP distci_services_registered Number of registered services by kind"
    )
    .ok();
    writeln!(output, "# TYPE distci_services_registered gauge").ok();

    for (kind, label) in [(ServiceKind::Builder, "builder"), (ServiceKind::Runner, "runner")] {
        let count = match state.store.find_services(kind).await {
            Ok(services) => services.len(),
            Err(e) => {
                warn!(error = %e, kind = %kind, "Failed to count services");
                0
            }
        };
        writeln!(output, "distci_services_registered{{kind=\"{label}\"}} {count}").ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use distci_core::{ServiceInfo, ServiceKey};
    use tokio_util::sync::CancellationToken;

    use crate::config::Config;
    use crate::dispatch::{DispatchError, Dispatcher};
    use crate::scheduler::Scheduler;
    use crate::store::{MemoryStore, Store};

    struct NoopDispatcher;

    #[async_trait::async_trait]
    impl Dispatcher for NoopDispatcher {
        async fn dispatch(
            &self,
            _test: &distci_core::Test,
            _id: &distci_core::TestId,
        ) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::spawn(4, Arc::new(NoopDispatcher), store.clone(), CancellationToken::new());
        let state = AppState::new(Config::default(), store.clone(), scheduler.handle());

        store
            .put_service(ServiceInfo {
                key: ServiceKey::generate(),
                kind: ServiceKind::Runner,
                goos: "linux".into(),
                goarch: "amd64".into(),
                url: "http://r".into(),
            })
            .await
            .unwrap();

        let output = collect_metrics(&state).await;

        assert!(output.contains("distci_tests_active 0"));
        assert!(output.contains("distci_slots_in_flight 0"));
        assert!(output.contains("distci_slots_capacity 4"));
        assert!(output.contains("distci_services_registered{kind=\"builder\"} 0"));
        assert!(output.contains("distci_services_registered{kind=\"runner\"} 1"));

        scheduler.shutdown().await;
    }
}
