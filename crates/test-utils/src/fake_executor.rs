use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use buildgraph::errors::ExecutorError;
use buildgraph::exec::{Executor, Job};

/// An executor that:
/// - counts how many jobs were submitted
/// - runs each job on a fresh, named OS thread.
#[derive(Debug, Default, Clone)]
pub struct SpawningExecutor {
    submitted: Arc<AtomicUsize>,
}

impl SpawningExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl Executor for SpawningExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        thread::Builder::new()
            .name(format!("test-executor-{n}"))
            .spawn(job)
            .map(|_| ())
            .map_err(ExecutorError::Spawn)
    }
}

/// An executor that refuses every job, as a shut-down pool would.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectingExecutor;

impl Executor for RejectingExecutor {
    fn execute(&self, _job: Job) -> Result<(), ExecutorError> {
        Err(ExecutorError::Shutdown)
    }
}

/// An executor that accepts every job and immediately drops it unrun.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardingExecutor;

impl Executor for DiscardingExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        drop(job);
        Ok(())
    }
}

/// An executor that accepts jobs and holds them until [`ParkingExecutor::discard`].
#[derive(Default, Clone)]
pub struct ParkingExecutor {
    parked: Arc<Mutex<Vec<Job>>>,
}

impl ParkingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parked(&self) -> usize {
        self.parked.lock().unwrap().len()
    }

    /// Drop every held job without running it.
    pub fn discard(&self) {
        let jobs = std::mem::take(&mut *self.parked.lock().unwrap());
        drop(jobs);
    }
}

impl Executor for ParkingExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        self.parked.lock().unwrap().push(job);
        Ok(())
    }
}
