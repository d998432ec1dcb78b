use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use buildgraph::engine::{BuildController, ControllerState};
use buildgraph::errors::{ControllerError, GraphError, LeaseError};
use buildgraph::graph::{PlanDraft, SkipReason, TaskNode, WorkGraph};
use buildgraph_test_utils::{controller, init_tracing, with_plan};

fn plan_names(controller: &BuildController) -> Vec<String> {
    with_plan(controller, |plan| {
        plan.tasks().unwrap().iter().map(|t| t.to_string()).collect()
    })
}

fn skip_reason(controller: &BuildController, task: &str) -> Option<SkipReason> {
    with_plan(controller, |plan| {
        plan.step(task).unwrap().expect("task is planned").skip_reason()
    })
}

fn schedule(controller: &mut BuildController, entries: &[&str]) {
    for entry in entries {
        controller.queue_for_execution(*entry).unwrap();
    }
    controller.schedule_queued_tasks().unwrap();
}

#[test]
fn plan_puts_dependencies_before_dependents() {
    init_tracing();
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("b");
            g.task("b").depends_on("c");
            g.task("c");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);

    controller.finalize_work_graph().unwrap();
    assert_eq!(plan_names(&controller), vec!["c", "b", "a"]);

    with_plan(&controller, |plan| {
        let deps: Vec<&str> = plan
            .dependencies_of("a")
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|p| p.as_str())
            .collect();
        assert_eq!(deps, vec!["b"]);

        let entries = plan.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].as_str(), "a");
        assert_eq!(plan.position("c"), Ok(Some(0)));
    });
}

#[test]
fn finalized_plan_is_only_readable_on_worker_threads() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);
    controller.finalize_work_graph().unwrap();

    assert!(!controller.leases().is_worker_thread());
    let query = controller.plan_query().unwrap();
    assert_eq!(query.tasks(), Err(LeaseError::NotAWorker));
    assert!(query.steps().is_err());
    assert!(query.step("a").is_err());
    assert!(query.entries().is_err());
    assert!(query.position("a").is_err());

    assert_eq!(plan_names(&controller), vec!["a"]);
}

#[test]
fn diamond_runs_shared_dependency_once_and_first() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("app").depends_on_all(["ui", "core"]);
            g.task("ui").depends_on("base");
            g.task("core").depends_on("base");
            g.task("base");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["app"]);
    controller.finalize_work_graph().unwrap();

    assert_eq!(plan_names(&controller), vec!["base", "ui", "core", "app"]);
}

#[test]
fn duplicate_edges_are_collapsed() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("b").depends_on("b");
            g.task("a").depends_on("b");
            g.task("b");
            Ok(())
        })
        .unwrap();

    let a = controller.graph().lookup("a").unwrap();
    assert_eq!(controller.graph().node(a).unwrap().successors().len(), 1);
}

#[test]
fn undefined_dependency_fails_finalization_naming_the_dependent() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("ghost");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);

    match controller.finalize_work_graph() {
        Err(ControllerError::Graph(GraphError::UnknownTask { task, required_by })) => {
            assert_eq!(task.as_str(), "ghost");
            assert_eq!(required_by.unwrap().as_str(), "a");
        }
        other => panic!("expected UnknownTask, got: {other:?}"),
    }
    assert_eq!(controller.state(), ControllerState::DiscoveringTasks);
}

#[test]
fn filtered_tasks_stay_in_the_plan_as_skipped() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("b");
            g.task("b");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);
    controller.add_filter(|node| node.path().as_str() != "b").unwrap();

    controller.finalize_work_graph().unwrap();
    with_plan(&controller, |plan| {
        assert_eq!(plan.contains("b"), Ok(true));
        assert_eq!(plan.is_skipped("b"), Ok(true));
        assert_eq!(plan.is_skipped("a"), Ok(false));
    });
    assert_eq!(skip_reason(&controller, "b"), Some(SkipReason::Filtered));
}

#[test]
fn finalization_actions_can_exclude_tasks() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("b").depends_on("c");
            g.task("b");
            g.task("c");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);

    let (tx, rx) = crossbeam_channel::unbounded();
    controller
        .add_finalization(move |draft| {
            tx.send((draft.len(), draft.exclude("c"), draft.exclude("not-planned")))
                .unwrap();
            Ok(())
        })
        .unwrap();

    controller.finalize_work_graph().unwrap();
    let (len, excluded_c, excluded_missing) = rx.try_recv().unwrap();
    assert_eq!(len, 3);
    assert!(excluded_c);
    assert!(!excluded_missing);
    assert_eq!(skip_reason(&controller, "c"), Some(SkipReason::Excluded));
    assert_eq!(with_plan(&controller, |plan| plan.contains("not-planned")), Ok(false));
}

#[test]
fn finalizations_run_in_registration_order() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);

    let (tx, rx) = crossbeam_channel::unbounded();
    for n in 0..3 {
        let tx = tx.clone();
        controller
            .add_finalization(move |_| {
                tx.send(n).unwrap();
                Ok(())
            })
            .unwrap();
    }
    controller.finalize_work_graph().unwrap();

    let order: Vec<i32> = rx.try_iter().collect();
    assert_eq!(order, vec![0, 1, 2]);
}

#[test]
fn failing_finalization_leaves_the_controller_discovering() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);
    controller
        .add_finalization(|_| Err(anyhow!("plan rejected")))
        .unwrap();

    match controller.finalize_work_graph() {
        Err(ControllerError::Graph(GraphError::Finalization(e))) => {
            assert_eq!(e.to_string(), "plan rejected")
        }
        other => panic!("expected a finalization error, got: {other:?}"),
    }
    assert_eq!(controller.state(), ControllerState::DiscoveringTasks);
    assert!(!controller.graph().is_finalized());
}

#[test]
fn populate_errors_keep_what_was_registered() {
    let mut graph = WorkGraph::new();
    let err = graph
        .populate(|g| {
            g.task("kept");
            Err(anyhow!("discovery failed"))
        })
        .unwrap_err();

    assert!(matches!(err, GraphError::Populate(_)));
    assert!(graph.lookup("kept").is_some());
}

#[test]
fn finalization_retry_reapplies_every_hook() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("b");
            g.task("b");
            Ok(())
        })
        .unwrap();
    schedule(&mut controller, &["a"]);

    controller
        .add_finalization(|draft| {
            draft.exclude("b");
            Ok(())
        })
        .unwrap();
    let failed_once = Arc::new(AtomicBool::new(false));
    {
        let failed_once = Arc::clone(&failed_once);
        controller
            .add_finalization(move |_| {
                if failed_once.swap(true, Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(anyhow!("transient"))
                }
            })
            .unwrap();
    }

    assert!(matches!(
        controller.finalize_work_graph(),
        Err(ControllerError::Graph(GraphError::Finalization(_)))
    ));
    assert_eq!(controller.state(), ControllerState::DiscoveringTasks);

    controller.finalize_work_graph().unwrap();
    assert_eq!(controller.state(), ControllerState::ReadyToRun);
    assert_eq!(skip_reason(&controller, "b"), Some(SkipReason::Excluded));
}

#[test]
fn scheduling_reports_whether_the_plan_grew() {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            g.task("a").depends_on("b");
            g.task("b");
            Ok(())
        })
        .unwrap();

    controller.queue_for_execution("a").unwrap();
    assert!(controller.schedule_queued_tasks().unwrap());

    let b = controller.queue_for_execution("b").unwrap();
    assert!(controller.graph().is_planned(b));
    assert!(!controller.schedule_queued_tasks().unwrap());
    assert_eq!(controller.graph().entries().count(), 2);
    assert_eq!(controller.graph().planned().count(), 2);
}

#[test]
fn finalized_work_graph_rejects_changes() {
    let mut graph = WorkGraph::new();
    graph
        .populate(|g| {
            g.task("a");
            Ok(())
        })
        .unwrap();
    graph.finalize().unwrap();
    assert!(graph.is_finalized());

    assert!(matches!(graph.node_for("b"), Err(GraphError::Finalized)));
    assert!(matches!(
        graph.populate(|g| {
            g.task("b");
            Ok(())
        }),
        Err(GraphError::Finalized)
    ));
    assert!(matches!(graph.add_filter(Box::new(|_: &TaskNode| true)), Err(GraphError::Finalized)));
    assert!(matches!(graph.add_finalization(Box::new(|_: &mut PlanDraft| -> anyhow::Result<()> { Ok(()) })), Err(GraphError::Finalized)));
    assert!(matches!(graph.finalize(), Err(GraphError::Finalized)));
    assert!(graph.lookup("b").is_none());
}
