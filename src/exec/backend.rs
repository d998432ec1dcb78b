// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The controller hands a single boxed job to an `Executor` and returns
//! immediately. Where that job runs is up to the implementation:
//!
//! - [`crate::exec::ThreadPool`] owns a fixed set of rayon worker threads.
//! - [`TokioExecutor`] uses the blocking pool of an existing tokio runtime,
//!   which is what the `buildgraph` binary uses.
//! - Tests can provide their own implementation (e.g. one that rejects jobs).

use tokio::runtime::Handle;
use tracing::debug;

use crate::errors::ExecutorError;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Trait abstracting where a build run executes.
pub trait Executor: Send + Sync {
    /// Accept `job` for asynchronous execution.
    ///
    /// Must not run the job on the calling thread and must not wait for it.
    /// Returning an error means the job was rejected and has been dropped.
    /// A job accepted with `Ok` but later dropped unrun is reported to the
    /// build as abandoned.
    fn execute(&self, job: Job) -> Result<(), ExecutorError>;
}

impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        (**self).execute(job)
    }
}

/// Runs jobs on tokio's blocking thread pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime the caller is running in.
    pub fn current() -> Result<Self, ExecutorError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        debug!("submitting build run to tokio blocking pool");
        // Results flow through the job itself. A runtime that is shutting
        // down drops the job, which the build reports as abandoned.
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }
}
