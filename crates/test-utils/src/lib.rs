pub mod builders;
pub mod fake_executor;
pub mod recording;

use std::sync::{Arc, Once};

use buildgraph::engine::BuildController;
use buildgraph::exec::WorkerLeaseService;
use buildgraph::graph::PlanQuery;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_names(true)
            .init();
    });
}

/// Fresh controller with its own lease service of `workers` permits.
pub fn controller(workers: usize) -> BuildController {
    BuildController::new(Arc::new(WorkerLeaseService::new(workers)))
}

/// Run `f` against the finalized plan while holding one of the controller's
/// worker leases on the current thread.
pub fn with_plan<R>(controller: &BuildController, f: impl FnOnce(PlanQuery<'_>) -> R) -> R {
    let query = controller.plan_query().expect("graph is finalized");
    controller.leases().run_as_worker(|| f(query))
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
