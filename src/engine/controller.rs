// src/engine/controller.rs

//! The build controller state machine.
//!
//! The controller is the only thing callers talk to. It owns the work graph
//! and the queued/scheduled bookkeeping, and it enforces the lifecycle:
//!
//! ```text
//! DiscoveringTasks --finalize--> ReadyToRun --start--> RunningTasks --run--> Finished
//! ```
//!
//! Every operation checks the current state first and fails with
//! [`ControllerError::StateViolation`] without touching anything when called
//! at the wrong time. Cycle errors leave the controller in `DiscoveringTasks`.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::engine::completion;
use crate::engine::outcome::{ExecutionFailure, ExecutionResult, panic_message};
use crate::engine::state::ControllerState;
use crate::errors::ControllerError;
use crate::exec::{Executor, Job, WorkerLeaseService};
use crate::graph::cycles::check_for_cycles;
use crate::graph::{ExecutionPlan, PlanDraft, PlanQuery, StopSignal, TaskNode, WorkGraph, WorkGraphBuilder};
use crate::types::{FailurePolicy, NodeId, TaskPath};

pub struct BuildController {
    graph: WorkGraph,
    /// Nodes merged into the graph's entry set.
    scheduled: BTreeSet<NodeId>,
    /// Nodes registered since the last scheduling pass.
    queued: BTreeSet<NodeId>,
    leases: Arc<WorkerLeaseService>,
    /// Shared with the worker so the `Finished` transition is visible here.
    state: Arc<Mutex<ControllerState>>,
    policy: FailurePolicy,
}

impl BuildController {
    pub fn new(leases: Arc<WorkerLeaseService>) -> Self {
        Self {
            graph: WorkGraph::new(),
            scheduled: BTreeSet::new(),
            queued: BTreeSet::new(),
            leases,
            state: Arc::new(Mutex::new(ControllerState::DiscoveringTasks)),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn graph(&self) -> &WorkGraph {
        &self.graph
    }

    pub fn leases(&self) -> &Arc<WorkerLeaseService> {
        &self.leases
    }

    /// Scheduled task paths, in registration order.
    pub fn scheduled_tasks(&self) -> Vec<TaskPath> {
        self.paths(&self.scheduled)
    }

    /// Queued task paths not yet handed to the graph, in registration order.
    pub fn queued_tasks(&self) -> Vec<TaskPath> {
        self.paths(&self.queued)
    }

    /// Register `path` as an entry point for the next scheduling pass.
    ///
    /// Queuing a task that is already queued or already scheduled has no
    /// further effect.
    pub fn queue_for_execution(&mut self, path: impl Into<TaskPath>) -> Result<NodeId, ControllerError> {
        self.ensure_state("queue_for_execution", ControllerState::DiscoveringTasks)?;

        let id = self.graph.node_for(path)?;
        if self.queued.insert(id) {
            debug!(task = %self.graph.task(id).path(), "queued task for execution");
        }
        Ok(id)
    }

    pub fn populate_work_graph<F>(&mut self, action: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut WorkGraphBuilder<'_>) -> anyhow::Result<()>,
    {
        self.ensure_state("populate_work_graph", ControllerState::DiscoveringTasks)?;
        self.graph.populate(action)?;
        Ok(())
    }

    /// Only planned tasks accepted by every filter execute. Rejected tasks
    /// stay in the plan, so their dependents still run.
    pub fn add_filter<F>(&mut self, filter: F) -> Result<(), ControllerError>
    where
        F: Fn(&TaskNode) -> bool + Send + Sync + 'static,
    {
        self.ensure_state("add_filter", ControllerState::DiscoveringTasks)?;
        self.graph.add_filter(Box::new(filter))?;
        Ok(())
    }

    /// Register an action applied to the draft plan during finalization.
    ///
    /// Actions run on every finalize attempt until one succeeds.
    pub fn add_finalization<F>(&mut self, action: F) -> Result<(), ControllerError>
    where
        F: Fn(&mut PlanDraft) -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_state("add_finalization", ControllerState::DiscoveringTasks)?;
        self.graph.add_finalization(Box::new(action))?;
        Ok(())
    }

    /// Merge the queued delta into the work graph.
    ///
    /// Returns `false` without touching the graph when every queued node is
    /// already scheduled. Otherwise returns whether the graph's planned set
    /// changed.
    pub fn schedule_queued_tasks(&mut self) -> Result<bool, ControllerError> {
        self.ensure_state("schedule_queued_tasks", ControllerState::DiscoveringTasks)?;

        let scheduled = &self.scheduled;
        self.queued.retain(|id| !scheduled.contains(id));
        if self.queued.is_empty() {
            debug!("no newly queued tasks to schedule");
            return Ok(false);
        }

        let changed = self.graph.schedule(&self.queued)?;
        info!(
            added = self.queued.len(),
            scheduled = self.scheduled.len() + self.queued.len(),
            changed,
            "scheduled queued tasks"
        );
        self.scheduled.append(&mut self.queued);
        Ok(changed)
    }

    /// Check for cycles and freeze the graph into an execution plan.
    pub fn finalize_work_graph(&mut self) -> Result<Arc<ExecutionPlan>, ControllerError> {
        self.ensure_state("finalize_work_graph", ControllerState::DiscoveringTasks)?;

        let pending: BTreeSet<NodeId> = self.queued.difference(&self.scheduled).copied().collect();
        if !pending.is_empty() {
            return Err(ControllerError::UnscheduledTasks(self.paths(&pending)));
        }
        self.queued.clear();

        check_for_cycles(&self.graph, self.scheduled.iter().copied())?;
        let plan = self.graph.finalize()?;

        self.set_state(ControllerState::ReadyToRun);
        info!(tasks = plan.len(), "build is ready to run");
        Ok(plan)
    }

    /// The frozen plan, once finalized.
    pub fn plan(&self) -> Option<&Arc<ExecutionPlan>> {
        self.graph.plan()
    }

    /// Worker-only query view of the frozen plan.
    pub fn plan_query(&self) -> Option<PlanQuery<'_>> {
        self.graph
            .plan()
            .map(|plan| PlanQuery::new(plan, &self.leases))
    }

    /// Hand the frozen plan to `executor` and return immediately.
    ///
    /// The submitted job takes a worker lease, runs the plan, releases the
    /// lease, marks the controller `Finished` and only then calls
    /// `on_complete`, exactly once, on the worker thread.
    ///
    /// If the executor rejects the job, `on_complete` is never called and the
    /// controller stays `ReadyToRun`. If it accepts the job but drops it
    /// unrun, `on_complete` gets [`ExecutionFailure::Abandoned`] on whichever
    /// thread dropped it.
    pub fn start_execution<E, F>(&mut self, executor: &E, on_complete: F) -> Result<(), ControllerError>
    where
        E: Executor + ?Sized,
        F: FnOnce(ExecutionResult) + Send + 'static,
    {
        let plan = match (self.state(), self.graph.plan()) {
            (ControllerState::ReadyToRun, Some(plan)) => Arc::clone(plan),
            (actual, _) => {
                return Err(self.violation("start_execution", ControllerState::ReadyToRun, actual));
            }
        };

        let leases = Arc::clone(&self.leases);
        let stop = self.graph.stop_signal();
        let policy = self.policy;
        let (submission, completion) = completion::submission(on_complete, Arc::clone(&self.state));

        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                leases.run_as_worker(|| plan.run(&leases, &stop, policy))
            }))
            .unwrap_or_else(|payload| Err(ExecutionFailure::Panicked(panic_message(payload.as_ref()))));
            completion.complete(result);
        });

        self.set_state(ControllerState::RunningTasks);
        let submitted = executor.execute(job);
        let dropped = submission.close();

        if let Err(err) = submitted {
            warn!(error = %err, "executor rejected build run");
            self.set_state(ControllerState::ReadyToRun);
            return Err(err.into());
        }

        match dropped {
            Some(on_complete) => {
                warn!("executor accepted the build run but dropped it");
                completion::deliver(&self.state, on_complete, Err(ExecutionFailure::Abandoned));
            }
            None => debug!("build run submitted to executor"),
        }
        Ok(())
    }

    /// Ask the work graph to stop. Valid in every state.
    pub fn stop(&self) {
        self.graph.stop();
    }

    /// Cloneable handle for stopping from another thread.
    pub fn stop_handle(&self) -> StopSignal {
        self.graph.stop_signal()
    }

    fn ensure_state(&self, operation: &'static str, expected: ControllerState) -> Result<(), ControllerError> {
        let actual = self.state();
        if actual != expected {
            return Err(self.violation(operation, expected, actual));
        }
        Ok(())
    }

    fn violation(
        &self,
        operation: &'static str,
        expected: ControllerState,
        actual: ControllerState,
    ) -> ControllerError {
        warn!(operation, %expected, %actual, "controller state violation");
        ControllerError::StateViolation {
            operation,
            expected,
            actual,
        }
    }

    fn set_state(&self, next: ControllerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        debug!(%from, to = %next, "controller state transition");
        *state = next;
    }

    fn paths(&self, ids: &BTreeSet<NodeId>) -> Vec<TaskPath> {
        ids.iter()
            .map(|&id| self.graph.task(id).path().clone())
            .collect()
    }
}

impl std::fmt::Debug for BuildController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildController")
            .field("state", &self.state())
            .field("scheduled", &self.scheduled.len())
            .field("queued", &self.queued.len())
            .field("policy", &self.policy)
            .field("graph", &self.graph)
            .finish()
    }
}
