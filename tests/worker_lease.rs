use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use buildgraph::engine::ExecutionFailure;
use buildgraph::errors::LeaseError;
use buildgraph::exec::WorkerLeaseService;
use buildgraph::graph::StopSignal;
use buildgraph::types::FailurePolicy;
use buildgraph_test_utils::{controller, init_tracing};

#[test]
fn pool_size_is_at_least_one() {
    assert_eq!(WorkerLeaseService::new(0).max_workers(), 1);
    assert_eq!(WorkerLeaseService::new(4).max_workers(), 4);
}

#[test]
fn run_as_worker_marks_only_the_current_call() {
    let leases = WorkerLeaseService::new(1);
    assert!(!leases.is_worker_thread());
    assert_eq!(leases.assert_worker(), Err(LeaseError::NotAWorker));

    let inside = leases.run_as_worker(|| {
        assert_eq!(leases.active_leases(), 1);
        leases.is_worker_thread()
    });
    assert!(inside);
    assert!(!leases.is_worker_thread());
    assert_eq!(leases.active_leases(), 0);
}

#[test]
fn run_as_worker_is_reentrant() {
    let leases = WorkerLeaseService::new(1);
    let depth = leases.run_as_worker(|| leases.run_as_worker(|| leases.run_as_worker(|| 3)));
    assert_eq!(depth, 3);
    assert_eq!(leases.active_leases(), 0);
}

#[test]
fn try_acquire_fails_when_the_pool_is_exhausted() {
    let leases = WorkerLeaseService::new(1);
    let held = leases.try_acquire().expect("pool starts empty");
    assert!(leases.is_worker_thread());
    assert!(leases.try_acquire().is_none());

    drop(held);
    assert!(!leases.is_worker_thread());
    assert!(leases.try_acquire().is_some());
}

#[test]
fn lease_is_released_when_the_work_panics() {
    let leases = WorkerLeaseService::new(1);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        leases.run_as_worker(|| panic!("task blew up"));
    }));

    assert!(result.is_err());
    assert_eq!(leases.active_leases(), 0);
    assert!(!leases.is_worker_thread());
}

#[test]
fn leases_from_one_service_do_not_count_for_another() {
    let first = WorkerLeaseService::new(1);
    let second = WorkerLeaseService::new(1);

    first.run_as_worker(|| {
        assert!(first.is_worker_thread());
        assert!(!second.is_worker_thread());
    });
}

#[test]
fn acquire_blocks_until_a_lease_is_released() {
    init_tracing();
    let leases = Arc::new(WorkerLeaseService::new(1));
    let (held_tx, held_rx) = crossbeam_channel::bounded(0);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let (acquired_tx, acquired_rx) = crossbeam_channel::bounded(1);

    let holder = {
        let leases = Arc::clone(&leases);
        thread::spawn(move || {
            let _lease = leases.acquire();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
    };
    held_rx.recv().unwrap();

    let waiter = {
        let leases = Arc::clone(&leases);
        thread::spawn(move || {
            leases.run_as_worker(|| acquired_tx.send(()).unwrap());
        })
    };

    assert!(acquired_rx.recv_timeout(Duration::from_millis(100)).is_err());
    release_tx.send(()).unwrap();
    assert!(acquired_rx.recv_timeout(Duration::from_secs(5)).is_ok());

    holder.join().unwrap();
    waiter.join().unwrap();
    assert_eq!(leases.active_leases(), 0);
}

#[test]
fn plan_queries_require_a_worker_lease() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("b");
            g.task("b");
            Ok(())
        })
        .unwrap();
    controller.queue_for_execution("a").unwrap();
    controller.schedule_queued_tasks().unwrap();
    controller.finalize_work_graph().unwrap();

    let query = controller.plan_query().expect("finalized");
    assert_eq!(query.len(), Err(LeaseError::NotAWorker));
    assert!(query.contains("a").is_err());
    assert!(query.dependencies_of("a").is_err());

    let leases = Arc::clone(controller.leases());
    leases.run_as_worker(|| {
        assert_eq!(query.len(), Ok(2));
        assert_eq!(query.contains("b"), Ok(true));
        assert_eq!(query.is_skipped("b"), Ok(false));
        let tasks: Vec<String> = query.tasks().unwrap().iter().map(|t| t.to_string()).collect();
        assert_eq!(tasks, vec!["b", "a"]);
    });
}

#[test]
fn plan_queries_fail_on_threads_without_a_lease() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a");
            Ok(())
        })
        .unwrap();
    controller.queue_for_execution("a").unwrap();
    controller.schedule_queued_tasks().unwrap();
    let plan = controller.finalize_work_graph().unwrap();
    let leases = Arc::clone(controller.leases());

    // A lease held here does not make another thread a worker.
    leases.run_as_worker(|| {
        let handle = {
            let plan = Arc::clone(&plan);
            let leases = Arc::clone(&leases);
            thread::spawn(move || {
                let query = buildgraph::graph::PlanQuery::new(&plan, &leases);
                query.len()
            })
        };
        assert_eq!(handle.join().unwrap(), Err(LeaseError::NotAWorker));
    });
}

#[test]
fn running_a_plan_off_a_worker_thread_is_rejected() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a");
            Ok(())
        })
        .unwrap();
    controller.queue_for_execution("a").unwrap();
    controller.schedule_queued_tasks().unwrap();
    let plan = controller.finalize_work_graph().unwrap();

    let result = plan.run(controller.leases(), &StopSignal::new(), FailurePolicy::FailFast);
    assert!(matches!(
        result,
        Err(ExecutionFailure::Lease(LeaseError::NotAWorker))
    ));
}
