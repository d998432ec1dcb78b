use std::collections::{BTreeSet, HashSet};

use buildgraph::engine::BuildController;
use buildgraph_test_utils::{controller, with_plan};
use proptest::prelude::*;

// Strategy to generate an acyclic dependency table.
// We ensure acyclicity by only allowing task N to depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    // Sanitize: only deps < i survive.
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

fn populated(deps: &[BTreeSet<usize>]) -> BuildController {
    let mut controller = controller(1);
    controller
        .populate_work_graph(|g| {
            for (i, task_deps) in deps.iter().enumerate() {
                g.task(name(i)).depends_on_all(task_deps.iter().map(|&d| name(d)));
            }
            Ok(())
        })
        .unwrap();
    controller
}

/// Everything reachable from `roots`, following dependencies.
fn closure(deps: &[BTreeSet<usize>], roots: impl IntoIterator<Item = usize>) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut stack: Vec<usize> = roots.into_iter().collect();
    while let Some(i) = stack.pop() {
        if seen.insert(i) {
            stack.extend(deps[i].iter().copied());
        }
    }
    seen
}

proptest! {
    #[test]
    fn plan_orders_every_dependency_before_its_dependent(
        deps in dag_strategy(12),
        entries in proptest::collection::vec(any::<usize>(), 1..4),
    ) {
        let mut controller = populated(&deps);
        let entries: BTreeSet<usize> = entries.into_iter().map(|e| e % deps.len()).collect();
        for &e in &entries {
            controller.queue_for_execution(name(e)).unwrap();
        }
        controller.schedule_queued_tasks().unwrap();
        controller.finalize_work_graph().unwrap();

        let expected = closure(&deps, entries.iter().copied());
        let positions: Vec<Option<usize>> = with_plan(&controller, |plan| {
            (0..deps.len()).map(|i| plan.position(&name(i)).unwrap()).collect()
        });
        prop_assert_eq!(positions.iter().flatten().count(), expected.len());

        for &i in &expected {
            let at = positions[i].unwrap();
            for &d in &deps[i] {
                let dep_at = positions[d].unwrap();
                prop_assert!(dep_at < at, "{} at {} must come before {} at {}", name(d), dep_at, name(i), at);
            }
        }
    }

    #[test]
    fn batching_does_not_change_what_is_scheduled(
        deps in dag_strategy(10),
        batches in proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 1..3),
            1..4,
        ),
    ) {
        let mut batched = populated(&deps);
        let mut all_at_once = populated(&deps);

        let mut every_entry = BTreeSet::new();
        for batch in &batches {
            for raw in batch {
                let e = raw % deps.len();
                every_entry.insert(e);
                batched.queue_for_execution(name(e)).unwrap();
            }
            batched.schedule_queued_tasks().unwrap();
        }
        for &e in &every_entry {
            all_at_once.queue_for_execution(name(e)).unwrap();
        }
        all_at_once.schedule_queued_tasks().unwrap();

        let scheduled = |c: &BuildController| -> BTreeSet<String> {
            c.scheduled_tasks().into_iter().map(|p| p.to_string()).collect()
        };
        prop_assert_eq!(scheduled(&batched), scheduled(&all_at_once));

        let planned = |c: &BuildController| -> BTreeSet<String> {
            c.graph()
                .planned()
                .filter_map(|id| c.graph().node(id))
                .map(|n| n.path().to_string())
                .collect()
        };
        let expected: BTreeSet<String> = closure(&deps, every_entry.iter().copied())
            .into_iter()
            .map(name)
            .collect();
        prop_assert_eq!(planned(&batched), expected);
    }
}
