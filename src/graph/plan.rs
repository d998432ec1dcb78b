// src/graph/plan.rs

//! The frozen, ordered result of finalizing a work graph, and the code that
//! walks it on a worker thread.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::engine::outcome::{ExecutionFailure, ExecutionResult, RunReport, TaskFailure, panic_message};
use crate::errors::LeaseError;
use crate::exec::{TaskAction, TaskContext, WorkerLeaseService};
use crate::graph::node::TaskNode;
use crate::graph::stop::StopSignal;
use crate::graph::work_graph::TaskFilter;
use crate::types::{FailurePolicy, NodeId, TaskPath};

/// Why a planned task will not execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Rejected by a filter registered with `add_filter`.
    Filtered,
    /// Excluded by a finalization action.
    Excluded,
}

/// One entry of the execution plan.
#[derive(Clone)]
pub struct PlanStep {
    path: TaskPath,
    /// Positions (in the plan) of this step's direct dependencies. Always
    /// smaller than the step's own position.
    dependencies: Vec<usize>,
    action: Option<Arc<dyn TaskAction>>,
    description: Option<String>,
    skip: Option<SkipReason>,
}

impl PlanStep {
    pub fn path(&self) -> &TaskPath {
        &self.path
    }

    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    pub fn action(&self) -> Option<&Arc<dyn TaskAction>> {
        self.action.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip
    }
}

impl std::fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanStep")
            .field("path", &self.path)
            .field("dependencies", &self.dependencies)
            .field("has_action", &self.action.is_some())
            .field("skip", &self.skip)
            .finish()
    }
}

/// Immutable execution plan: every planned task, dependencies first.
///
/// The plan itself is an opaque handle outside the crate. Reads go through
/// [`PlanQuery`], which only answers on worker threads.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    steps: Vec<PlanStep>,
    index: HashMap<TaskPath, usize>,
    entries: Vec<TaskPath>,
}

impl ExecutionPlan {
    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub(crate) fn tasks(&self) -> impl Iterator<Item = &TaskPath> {
        self.steps.iter().map(|s| &s.path)
    }

    pub(crate) fn entries(&self) -> &[TaskPath] {
        &self.entries
    }

    pub(crate) fn position(&self, path: &str) -> Option<usize> {
        self.index.get(path).copied()
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub(crate) fn step(&self, path: &str) -> Option<&PlanStep> {
        self.position(path).map(|i| &self.steps[i])
    }

    pub(crate) fn dependencies_of(&self, path: &str) -> Option<Vec<&TaskPath>> {
        let step = self.step(path)?;
        Some(
            step.dependencies
                .iter()
                .map(|&i| &self.steps[i].path)
                .collect(),
        )
    }

    pub(crate) fn is_skipped(&self, path: &str) -> bool {
        self.step(path).is_some_and(|s| s.skip.is_some())
    }

    /// Execute the plan on the current thread.
    ///
    /// Must be called while holding a lease from `leases`. Steps run in plan
    /// order; the stop signal is checked before each one. A step whose
    /// dependency failed (or was itself blocked) is reported as blocked and
    /// does not run. With [`FailurePolicy::FailFast`] the walk ends at the
    /// first failure.
    pub fn run(
        &self,
        leases: &WorkerLeaseService,
        stop: &StopSignal,
        policy: FailurePolicy,
    ) -> ExecutionResult {
        leases.assert_worker()?;

        if stop.is_requested() {
            info!(tasks = self.steps.len(), "stop requested before the run started; nothing executed");
            return Ok(RunReport {
                stopped: true,
                ..RunReport::default()
            });
        }

        let query = PlanQuery::new(self, leases);
        let mut report = RunReport::default();
        let mut failed = vec![false; self.steps.len()];
        let mut failures = Vec::new();

        info!(tasks = self.steps.len(), ?policy, "running execution plan");

        for (position, step) in self.steps.iter().enumerate() {
            if stop.is_requested() {
                warn!(
                    executed = report.executed.len(),
                    remaining = self.steps.len() - position,
                    "stop requested; abandoning remaining tasks"
                );
                report.stopped = true;
                break;
            }

            if let Some(reason) = step.skip {
                debug!(task = %step.path, ?reason, "skipping task");
                report.skipped.push(step.path.clone());
                continue;
            }

            if let Some(&dep) = step.dependencies.iter().find(|&&d| failed[d]) {
                debug!(
                    task = %step.path,
                    dependency = %self.steps[dep].path,
                    "dependency did not succeed; task blocked"
                );
                failed[position] = true;
                report.blocked.push(step.path.clone());
                continue;
            }

            let ctx = TaskContext::new(&step.path, query, stop);
            match run_step(step, &ctx) {
                Ok(()) => report.executed.push(step.path.clone()),
                Err(err) => {
                    error!(task = %step.path, error = %err, "task failed");
                    failed[position] = true;
                    failures.push(TaskFailure::new(step.path.clone(), err));
                    if policy == FailurePolicy::FailFast {
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(ExecutionFailure::Tasks { failures, report })
        }
    }
}

fn run_step(step: &PlanStep, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let Some(action) = &step.action else {
        debug!(task = %step.path, "task has no action; nothing to do");
        return Ok(());
    };

    let started = Instant::now();
    info!(task = %step.path, "executing task");

    let result = match panic::catch_unwind(AssertUnwindSafe(|| action.execute(ctx))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("task panicked: {}", panic_message(payload.as_ref()))),
    };

    debug!(
        task = %step.path,
        elapsed_ms = started.elapsed().as_millis() as u64,
        success = result.is_ok(),
        "task finished"
    );
    result
}

/// Plan under construction, handed to finalization actions.
///
/// Finalizations can inspect the ordered plan and exclude tasks from
/// execution; they cannot add tasks or edges.
#[derive(Debug)]
pub struct PlanDraft {
    plan: ExecutionPlan,
}

impl PlanDraft {
    pub(crate) fn new(nodes: &[&TaskNode], filters: &[TaskFilter], entries: Vec<TaskPath>) -> Self {
        let position: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();

        let steps: Vec<PlanStep> = nodes
            .iter()
            .map(|node| PlanStep {
                path: node.path.clone(),
                dependencies: node
                    .successors
                    .iter()
                    .filter_map(|dep| position.get(dep).copied())
                    .collect(),
                action: node.action.clone(),
                description: node.description.clone(),
                skip: if filters.iter().all(|keep| keep(*node)) {
                    None
                } else {
                    Some(SkipReason::Filtered)
                },
            })
            .collect();

        let index = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.path.clone(), i))
            .collect();

        Self {
            plan: ExecutionPlan {
                steps,
                index,
                entries,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskPath> {
        self.plan.tasks()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.plan.contains(path)
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        self.plan.is_skipped(path)
    }

    pub fn dependencies_of(&self, path: &str) -> Option<Vec<&TaskPath>> {
        self.plan.dependencies_of(path)
    }

    /// Keep `path` in the plan (its dependents still run) but do not execute
    /// it. Returns `false` if the task is not part of the plan.
    pub fn exclude(&mut self, path: &str) -> bool {
        let Some(i) = self.plan.position(path) else {
            return false;
        };
        let step = &mut self.plan.steps[i];
        if step.skip.is_none() {
            debug!(task = %step.path, "task excluded by finalization");
            step.skip = Some(SkipReason::Excluded);
        }
        true
    }

    pub(crate) fn freeze(self) -> ExecutionPlan {
        self.plan
    }
}

/// Read access to a frozen plan that is only valid on worker threads.
///
/// Every method first checks that the calling thread holds a lease from the
/// service the query was created with, and fails with
/// [`LeaseError::NotAWorker`] otherwise.
#[derive(Debug, Clone, Copy)]
pub struct PlanQuery<'a> {
    plan: &'a ExecutionPlan,
    leases: &'a WorkerLeaseService,
}

impl<'a> PlanQuery<'a> {
    pub fn new(plan: &'a ExecutionPlan, leases: &'a WorkerLeaseService) -> Self {
        Self { plan, leases }
    }

    pub fn len(&self) -> Result<usize, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.len())
    }

    pub fn is_empty(&self) -> Result<bool, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.is_empty())
    }

    /// Steps in execution order.
    pub fn steps(&self) -> Result<&'a [PlanStep], LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.steps())
    }

    /// Task paths in execution order.
    pub fn tasks(&self) -> Result<Vec<&'a TaskPath>, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.tasks().collect())
    }

    /// The tasks that were explicitly scheduled, in registration order.
    pub fn entries(&self) -> Result<&'a [TaskPath], LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.entries())
    }

    pub fn position(&self, path: &str) -> Result<Option<usize>, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.position(path))
    }

    pub fn contains(&self, path: &str) -> Result<bool, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.contains(path))
    }

    pub fn step(&self, path: &str) -> Result<Option<&'a PlanStep>, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.step(path))
    }

    pub fn dependencies_of(&self, path: &str) -> Result<Option<Vec<&'a TaskPath>>, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.dependencies_of(path))
    }

    pub fn is_skipped(&self, path: &str) -> Result<bool, LeaseError> {
        self.leases.assert_worker()?;
        Ok(self.plan.is_skipped(path))
    }
}
