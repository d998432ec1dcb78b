// src/graph/cycles.rs

//! Dependency cycle detection over a populated work graph.
//!
//! Detection and diagnosis are two separate passes. [`check_for_cycles`] is a
//! plain mark-based DFS that only answers "is there a cycle, and where did we
//! first notice it". Only when it finds one do we pay for strongly connected
//! components, loop extraction and rendering.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::errors::CycleError;
use crate::graph::render::{render_chain, render_tree};
use crate::graph::work_graph::WorkGraph;
use crate::types::{NodeId, TaskPath};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// Walk every node reachable from `roots` and fail on the first back edge.
///
/// Roots are visited in the order given (callers pass a `BTreeSet`, i.e.
/// registration order) and successors in declaration order, so the offending
/// node, and therefore the reported cycle, is the same on every run.
pub(crate) fn check_for_cycles<I>(graph: &WorkGraph, roots: I) -> Result<(), CycleError>
where
    I: IntoIterator<Item = NodeId>,
{
    let mut marks = vec![Mark::Unvisited; graph.len()];

    for root in roots {
        if marks[root.index()] != Mark::Unvisited {
            continue;
        }

        marks[root.index()] = Mark::Visiting;
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];

        while let Some(frame) = stack.last_mut() {
            let (id, next) = *frame;
            let deps = successors(graph, id);

            let Some(&dep) = deps.get(next) else {
                marks[id.index()] = Mark::Visited;
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dep.index()] {
                Mark::Unvisited => {
                    marks[dep.index()] = Mark::Visiting;
                    stack.push((dep, 0));
                }
                Mark::Visiting => return Err(describe_cycle(graph, dep)),
                Mark::Visited => {}
            }
        }
    }

    debug!(nodes = graph.len(), "no dependency cycles found");
    Ok(())
}

fn successors(graph: &WorkGraph, id: NodeId) -> &[NodeId] {
    graph.task(id).successors()
}

fn path_of(graph: &WorkGraph, id: NodeId) -> &TaskPath {
    graph.task(id).path()
}

/// Build the diagnostic for a cycle that passes through `offender`.
fn describe_cycle(graph: &WorkGraph, offender: NodeId) -> CycleError {
    let component = cyclic_component(graph, offender);
    let members: HashSet<NodeId> = component.iter().copied().collect();

    let start = if members.contains(&offender) {
        offender
    } else {
        component.iter().copied().min().unwrap_or(offender)
    };

    let chain: Vec<TaskPath> = extract_loop(graph, start, &members)
        .into_iter()
        .map(|id| path_of(graph, id).clone())
        .collect();

    let tree = render_tree(path_of(graph, start), |path| {
        graph
            .lookup(path.as_str())
            .map(|id| {
                successors(graph, id)
                    .iter()
                    .filter(|s| members.contains(*s))
                    .map(|&s| path_of(graph, s))
                    .collect()
            })
            .unwrap_or_default()
    });

    warn!(
        cycle = %render_chain(&chain),
        component = members.len(),
        "dependency cycle detected"
    );

    CycleError::new(chain, tree)
}

/// The strongly connected component to report: among the cyclic components
/// reachable from `offender`, the one containing the earliest-registered node.
fn cyclic_component(graph: &WorkGraph, offender: NodeId) -> Vec<NodeId> {
    let mut sub: DiGraph<NodeId, ()> = DiGraph::new();
    let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();

    let mut stack = vec![offender];
    let mut reachable = Vec::new();
    while let Some(id) = stack.pop() {
        if index.contains_key(&id) {
            continue;
        }
        index.insert(id, sub.add_node(id));
        reachable.push(id);
        stack.extend(successors(graph, id).iter().rev().copied());
    }

    for &id in &reachable {
        for dep in successors(graph, id) {
            if let (Some(&from), Some(&to)) = (index.get(&id), index.get(dep)) {
                sub.add_edge(from, to, ());
            }
        }
    }

    tarjan_scc(&sub)
        .into_iter()
        .map(|scc| scc.into_iter().map(|ix| sub[ix]).collect::<Vec<NodeId>>())
        .filter(|scc| {
            scc.len() > 1 || scc.first().is_some_and(|&id| successors(graph, id).contains(&id))
        })
        .min_by_key(|scc| scc.iter().copied().min())
        .unwrap_or_else(|| vec![offender])
}

/// A closed walk `start → … → start` that stays inside `members`.
///
/// Successors are tried in declaration order, so the result is stable.
fn extract_loop(graph: &WorkGraph, start: NodeId, members: &HashSet<NodeId>) -> Vec<NodeId> {
    let mut seen: HashSet<NodeId> = HashSet::from([start]);
    let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];

    while let Some(frame) = stack.last_mut() {
        let (id, next) = *frame;
        let Some(&dep) = successors(graph, id).get(next) else {
            stack.pop();
            continue;
        };
        frame.1 += 1;

        if dep == start {
            let mut chain: Vec<NodeId> = stack.iter().map(|(id, _)| *id).collect();
            chain.push(start);
            return chain;
        }
        if members.contains(&dep) && seen.insert(dep) {
            stack.push((dep, 0));
        }
    }

    vec![start, start]
}
