// src/exec/action.rs

use std::fmt;
use std::sync::Arc;

use crate::graph::{PlanQuery, StopSignal};
use crate::types::TaskPath;

/// The work attached to a task node.
///
/// Actions run on a worker thread, one at a time per run, in plan order.
/// Returning an error (or panicking) marks the task as failed.
pub trait TaskAction: Send + Sync {
    fn execute(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()>;

    /// Short human-readable summary, shown by `--dry-run`.
    fn describe(&self) -> Option<String> {
        None
    }
}

/// What an action can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    task: &'a TaskPath,
    plan: PlanQuery<'a>,
    stop: &'a StopSignal,
}

impl<'a> TaskContext<'a> {
    pub fn new(task: &'a TaskPath, plan: PlanQuery<'a>, stop: &'a StopSignal) -> Self {
        Self { task, plan, stop }
    }

    pub fn task(&self) -> &'a TaskPath {
        self.task
    }

    /// Worker-only view of the plan being run.
    pub fn plan(&self) -> PlanQuery<'a> {
        self.plan
    }

    /// Long-running actions may poll this and return early.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_requested()
    }
}

/// Adapter turning a closure into a [`TaskAction`].
pub struct FnAction<F> {
    f: F,
}

impl<F> TaskAction for FnAction<F>
where
    F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        (self.f)(ctx)
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAction")
    }
}

pub fn action_fn<F>(f: F) -> Arc<dyn TaskAction>
where
    F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnAction { f })
}
