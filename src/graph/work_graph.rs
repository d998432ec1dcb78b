// src/graph/work_graph.rs

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::GraphError;
use crate::exec::TaskAction;
use crate::graph::node::TaskNode;
use crate::graph::plan::{ExecutionPlan, PlanDraft};
use crate::graph::stop::StopSignal;
use crate::types::{NodeId, TaskPath};

/// Predicate deciding whether a planned task actually executes.
pub type TaskFilter = Box<dyn Fn(&TaskNode) -> bool + Send + Sync>;

/// Transform applied to the draft plan right before it is frozen.
///
/// Runs once per finalize attempt, so a retry after a failed attempt applies
/// every registered action again to a fresh draft.
pub type Finalization = Box<dyn Fn(&mut PlanDraft) -> anyhow::Result<()> + Send>;

/// Arena of task nodes for a single build.
///
/// Nodes are created on first reference and never removed. Edges are stored
/// on the nodes as [`NodeId`]s, so every lookup during scheduling and cycle
/// detection is a plain index into `nodes`.
///
/// The graph distinguishes:
/// - `entries`: nodes explicitly handed to [`WorkGraph::schedule`]
/// - `planned`: entries plus everything they transitively depend on
///
/// Once [`WorkGraph::finalize`] succeeds the graph is frozen and every
/// mutating method returns [`GraphError::Finalized`].
pub struct WorkGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskPath, NodeId>,
    entries: BTreeSet<NodeId>,
    planned: BTreeSet<NodeId>,
    filters: Vec<TaskFilter>,
    finalizations: Vec<Finalization>,
    stop: StopSignal,
    plan: Option<Arc<ExecutionPlan>>,
}

impl WorkGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            entries: BTreeSet::new(),
            planned: BTreeSet::new(),
            filters: Vec::new(),
            finalizations: Vec::new(),
            stop: StopSignal::new(),
            plan: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.nodes.get(id.index())
    }

    /// Node for an id issued by this graph.
    pub(crate) fn task(&self, id: NodeId) -> &TaskNode {
        &self.nodes[id.index()]
    }

    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// All nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }

    pub fn entries(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().copied()
    }

    pub fn planned(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.planned.iter().copied()
    }

    pub fn is_planned(&self, id: NodeId) -> bool {
        self.planned.contains(&id)
    }

    pub fn is_finalized(&self) -> bool {
        self.plan.is_some()
    }

    /// The frozen plan, once [`WorkGraph::finalize`] has succeeded.
    pub fn plan(&self) -> Option<&Arc<ExecutionPlan>> {
        self.plan.as_ref()
    }

    /// Resolve a path to its node, registering a placeholder if needed.
    pub fn node_for(&mut self, path: impl Into<TaskPath>) -> Result<NodeId, GraphError> {
        self.ensure_mutable()?;
        Ok(self.get_or_create(path.into()))
    }

    /// Run a builder action against the graph.
    ///
    /// Nodes and edges registered before the action returns an error are kept.
    pub fn populate<F>(&mut self, action: F) -> Result<(), GraphError>
    where
        F: FnOnce(&mut WorkGraphBuilder<'_>) -> anyhow::Result<()>,
    {
        self.ensure_mutable()?;

        let before = self.nodes.len();
        let mut builder = WorkGraphBuilder { graph: &mut *self };
        action(&mut builder).map_err(GraphError::Populate)?;

        debug!(
            added = self.nodes.len() - before,
            total = self.nodes.len(),
            "work graph populated"
        );
        Ok(())
    }

    pub fn add_filter(&mut self, filter: TaskFilter) -> Result<(), GraphError> {
        self.ensure_mutable()?;
        self.filters.push(filter);
        Ok(())
    }

    pub fn add_finalization(&mut self, finalization: Finalization) -> Result<(), GraphError> {
        self.ensure_mutable()?;
        self.finalizations.push(finalization);
        Ok(())
    }

    /// Add `pending` to the entry set and recompute the planned set.
    ///
    /// Returns `true` if the planned set grew. Because entries and edges only
    /// ever grow, the planned set never shrinks. Ids must have been issued by
    /// this graph; callers go through the controller, which only holds ids it
    /// resolved here.
    pub(crate) fn schedule(&mut self, pending: &BTreeSet<NodeId>) -> Result<bool, GraphError> {
        self.ensure_mutable()?;

        self.entries.extend(
            pending
                .iter()
                .copied()
                .filter(|id| id.index() < self.nodes.len()),
        );

        let planned = self.closure();
        let changed = planned.len() != self.planned.len();

        debug!(
            requested = pending.len(),
            entries = self.entries.len(),
            planned = planned.len(),
            changed,
            "scheduled tasks into work graph"
        );

        self.planned = planned;
        Ok(changed)
    }

    /// Freeze the graph into an ordered [`ExecutionPlan`].
    ///
    /// Steps, in order:
    /// 1. recompute the planned set (edges may have been added since the last
    ///    `schedule`)
    /// 2. reject planned nodes that were referenced but never defined
    /// 3. order the plan so dependencies precede their dependents
    /// 4. mark tasks rejected by any filter as skipped
    /// 5. run finalization actions in registration order
    ///
    /// If an action fails the graph stays unfrozen and every action stays
    /// registered. Actions are dropped only once the plan is frozen.
    pub fn finalize(&mut self) -> Result<Arc<ExecutionPlan>, GraphError> {
        self.ensure_mutable()?;

        self.planned = self.closure();
        self.check_defined()?;
        let order = self.execution_order()?;

        let entries: Vec<TaskPath> = self
            .entries
            .iter()
            .map(|id| self.nodes[id.index()].path.clone())
            .collect();

        let nodes: Vec<&TaskNode> = order.iter().map(|id| &self.nodes[id.index()]).collect();
        let mut draft = PlanDraft::new(&nodes, &self.filters, entries);

        for (n, finalization) in self.finalizations.iter().enumerate() {
            if let Err(err) = finalization(&mut draft) {
                debug!(action = n, registered = self.finalizations.len(), "finalization action failed");
                return Err(GraphError::Finalization(err));
            }
        }

        let plan = Arc::new(draft.freeze());
        self.finalizations.clear();
        info!(
            tasks = plan.len(),
            skipped = plan.steps().iter().filter(|s| s.skip_reason().is_some()).count(),
            "work graph finalized"
        );

        self.plan = Some(Arc::clone(&plan));
        Ok(plan)
    }

    /// Signal the frozen plan (or a future run of it) to unwind.
    pub fn stop(&self) {
        if !self.stop.is_requested() {
            info!(finalized = self.is_finalized(), "stop requested for work graph");
        }
        self.stop.request();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn ensure_mutable(&self) -> Result<(), GraphError> {
        if self.plan.is_some() {
            return Err(GraphError::Finalized);
        }
        Ok(())
    }

    fn get_or_create(&mut self, path: TaskPath) -> NodeId {
        if let Some(&id) = self.index.get(&path) {
            return id;
        }

        let id = NodeId::new(self.nodes.len());
        debug!(task = %path, node = id.index(), "registering task node");
        self.index.insert(path.clone(), id);
        self.nodes.push(TaskNode::placeholder(id, path));
        id
    }

    /// Entries plus everything reachable through successor edges.
    fn closure(&self) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.entries.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.nodes[id.index()].successors.iter().rev().copied());
        }

        seen
    }

    fn check_defined(&self) -> Result<(), GraphError> {
        let Some(missing) = self
            .planned
            .iter()
            .map(|id| &self.nodes[id.index()])
            .find(|node| !node.defined)
        else {
            return Ok(());
        };

        let required_by = self
            .planned
            .iter()
            .map(|id| &self.nodes[id.index()])
            .find(|node| node.successors.contains(&missing.id))
            .map(|node| node.path.clone());

        Err(GraphError::UnknownTask {
            task: missing.path.clone(),
            required_by,
        })
    }

    /// Post-order DFS from the entries (in registration order), following
    /// successors in declaration order. Every dependency lands before its
    /// dependents.
    fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            New,
            Open,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut order = Vec::with_capacity(self.planned.len());

        for &root in &self.entries {
            if marks[root.index()] != Mark::New {
                continue;
            }

            marks[root.index()] = Mark::Open;
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];

            while let Some(frame) = stack.last_mut() {
                let (id, next) = *frame;

                match self.nodes[id.index()].successors.get(next) {
                    Some(&dep) => {
                        frame.1 += 1;
                        match marks[dep.index()] {
                            Mark::New => {
                                marks[dep.index()] = Mark::Open;
                                stack.push((dep, 0));
                            }
                            Mark::Open => {
                                return Err(GraphError::Cyclic {
                                    task: self.nodes[dep.index()].path.clone(),
                                });
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[id.index()] = Mark::Done;
                        order.push(id);
                        stack.pop();
                    }
                }
            }
        }

        Ok(order)
    }
}

impl Default for WorkGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkGraph")
            .field("nodes", &self.nodes.len())
            .field("entries", &self.entries)
            .field("planned", &self.planned)
            .field("filters", &self.filters.len())
            .field("finalizations", &self.finalizations.len())
            .field("finalized", &self.plan.is_some())
            .finish()
    }
}

/// Mutable view handed to [`WorkGraph::populate`] actions.
pub struct WorkGraphBuilder<'g> {
    graph: &'g mut WorkGraph,
}

impl WorkGraphBuilder<'_> {
    /// Define (or re-open) a task.
    pub fn task(&mut self, path: impl Into<TaskPath>) -> TaskDefinition<'_> {
        let id = self.graph.get_or_create(path.into());
        self.graph.nodes[id.index()].defined = true;
        TaskDefinition {
            graph: &mut *self.graph,
            id,
        }
    }

    /// Resolve a path without defining it.
    pub fn reference(&mut self, path: impl Into<TaskPath>) -> NodeId {
        self.graph.get_or_create(path.into())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.graph.index.contains_key(path)
    }
}

/// Chained setter for a single task's edges and action.
pub struct TaskDefinition<'b> {
    graph: &'b mut WorkGraph,
    id: NodeId,
}

impl TaskDefinition<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Declare that this task needs `dep` to complete first.
    pub fn depends_on(self, dep: impl Into<TaskPath>) -> Self {
        let dep = self.graph.get_or_create(dep.into());
        if self.graph.nodes[self.id.index()].add_successor(dep) {
            debug!(
                task = %self.graph.nodes[self.id.index()].path,
                dependency = %self.graph.nodes[dep.index()].path,
                "added dependency edge"
            );
        }
        self
    }

    pub fn depends_on_all<I, P>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<TaskPath>,
    {
        for dep in deps {
            self = self.depends_on(dep);
        }
        self
    }

    pub fn action(self, action: Arc<dyn TaskAction>) -> Self {
        self.graph.nodes[self.id.index()].action = Some(action);
        self
    }

    pub fn description(self, text: impl Into<String>) -> Self {
        self.graph.nodes[self.id.index()].description = Some(text.into());
        self
    }
}
