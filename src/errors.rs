// src/errors.rs

//! Crate-wide error types.
//!
//! Contract violations (state, unscheduled queue) and cycles are returned
//! synchronously by the controller. Failures while running a frozen plan are
//! not errors of the controller at all: they travel through the completion
//! callback as [`crate::engine::ExecutionFailure`].

use thiserror::Error;

use crate::engine::{ControllerState, ExecutionFailure};
use crate::graph::render::render_chain;
use crate::types::TaskPath;

#[derive(Error, Debug)]
pub enum BuildgraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error("Build failed: {0}")]
    Execution(#[from] ExecutionFailure),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors returned synchronously by [`crate::engine::BuildController`].
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("{operation} is not allowed while the build is {actual} (expected {expected})")]
    StateViolation {
        operation: &'static str,
        expected: ControllerState,
        actual: ControllerState,
    },

    #[error("queued tasks have not been scheduled: {}", join_paths(.0))]
    UnscheduledTasks(Vec<TaskPath>),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("executor rejected the build run: {0}")]
    Executor(#[from] ExecutorError),
}

/// Errors raised by the work graph itself.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("work graph is finalized; no further changes are accepted")]
    Finalized,

    #[error("task '{task}' is not defined{}", required_by_suffix(.required_by))]
    UnknownTask {
        task: TaskPath,
        required_by: Option<TaskPath>,
    },

    #[error("dependency cycle through task '{task}' found while ordering the plan")]
    Cyclic { task: TaskPath },

    #[error("populating the work graph failed: {0}")]
    Populate(#[source] anyhow::Error),

    #[error("work graph finalization action failed: {0}")]
    Finalization(#[source] anyhow::Error),
}

/// A dependency cycle found while finalizing the work graph.
///
/// `chain` is closed: its first and last entries are the same task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circular dependency between the following tasks: {}", render_chain(.chain))]
pub struct CycleError {
    chain: Vec<TaskPath>,
    tree: String,
}

impl CycleError {
    pub(crate) fn new(chain: Vec<TaskPath>, tree: String) -> Self {
        Self { chain, tree }
    }

    /// The offending loop, first entry repeated at the end.
    pub fn chain(&self) -> &[TaskPath] {
        &self.chain
    }

    /// Tasks on the loop, without the closing repetition.
    pub fn members(&self) -> &[TaskPath] {
        &self.chain[..self.chain.len().saturating_sub(1)]
    }

    /// Indented tree rendering of the cycle.
    pub fn tree(&self) -> &str {
        &self.tree
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseError {
    #[error("the build graph cannot be queried from a thread that does not hold a worker lease")]
    NotAWorker,
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("executor has been shut down")]
    Shutdown,

    #[error("thread pool size must be >= 1 (got 0)")]
    EmptyPool,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to build worker pool: {0}")]
    Build(#[source] rayon::ThreadPoolBuildError),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

fn join_paths(paths: &[TaskPath]) -> String {
    paths
        .iter()
        .map(TaskPath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn required_by_suffix(required_by: &Option<TaskPath>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{parent}')"),
        None => String::new(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BuildgraphError>;
