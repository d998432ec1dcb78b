// src/engine/outcome.rs

//! Terminal result of a build run, as delivered to the completion callback.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::errors::LeaseError;
use crate::types::TaskPath;

/// Result handed to the completion callback: a run report on success, the
/// captured failure otherwise. Never both, never neither.
pub type ExecutionResult = Result<RunReport, ExecutionFailure>;

/// What happened to each planned task during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Tasks that ran to completion, in execution order.
    pub executed: Vec<TaskPath>,
    /// Tasks filtered or excluded from execution.
    pub skipped: Vec<TaskPath>,
    /// Tasks not run because a dependency failed.
    pub blocked: Vec<TaskPath>,
    /// The run observed a stop request before finishing the plan.
    pub stopped: bool,
}

impl RunReport {
    /// `true` if the run was stopped before any task executed.
    pub fn never_ran(&self) -> bool {
        self.stopped && self.executed.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executed, {} skipped, {} blocked",
            self.executed.len(),
            self.skipped.len(),
            self.blocked.len()
        )?;
        if self.stopped {
            f.write_str(" (stopped)")?;
        }
        Ok(())
    }
}

/// A single task whose action returned an error or panicked.
#[derive(Debug, Error)]
#[error("task '{task}' failed: {source:#}")]
pub struct TaskFailure {
    pub task: TaskPath,
    pub source: anyhow::Error,
}

impl TaskFailure {
    pub fn new(task: TaskPath, source: anyhow::Error) -> Self {
        Self { task, source }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("{}", describe_failures(.failures))]
    Tasks {
        failures: Vec<TaskFailure>,
        report: RunReport,
    },

    #[error("build run panicked: {0}")]
    Panicked(String),

    /// The executor accepted the run but dropped it without ever starting it,
    /// e.g. because its runtime was shutting down.
    #[error("build run was dropped by the executor before it started")]
    Abandoned,

    #[error(transparent)]
    Lease(#[from] LeaseError),
}

impl ExecutionFailure {
    /// Paths of the tasks that failed, in the order they failed.
    pub fn failed_tasks(&self) -> Vec<&TaskPath> {
        match self {
            ExecutionFailure::Tasks { failures, .. } => failures.iter().map(|f| &f.task).collect(),
            _ => Vec::new(),
        }
    }

    /// The partial report of a run that had task failures.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            ExecutionFailure::Tasks { report, .. } => Some(report),
            _ => None,
        }
    }
}

fn describe_failures(failures: &[TaskFailure]) -> String {
    match failures {
        [single] => single.to_string(),
        many => {
            let lines: Vec<String> = many.iter().map(|f| format!("  - {f}")).collect();
            format!("{} tasks failed:\n{}", many.len(), lines.join("\n"))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
