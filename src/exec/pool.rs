// src/exec/pool.rs

use std::thread;

use tracing::{debug, error};

use crate::engine::outcome::panic_message;
use crate::errors::ExecutorError;
use crate::exec::backend::{Executor, Job};

/// Fixed-size pool of named worker threads backed by rayon.
///
/// A panicking job is logged by the pool's panic handler and does not take
/// its worker down. Dropping the pool does not wait, but jobs already
/// submitted still run before the workers exit.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool {
    pub fn new(size: usize) -> Result<Self, ExecutorError> {
        // rayon reads 0 as "one thread per core".
        if size == 0 {
            return Err(ExecutorError::EmptyPool);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("buildgraph-worker-{i}"))
            .panic_handler(|payload| {
                error!(
                    worker = thread::current().name().unwrap_or("unnamed"),
                    panic = %panic_message(payload.as_ref()),
                    "job panicked"
                );
            })
            .build()
            .map_err(ExecutorError::Build)?;

        debug!(size, "thread pool started");
        Ok(Self { pool })
    }

    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Executor for ThreadPool {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        self.pool.spawn(job);
        Ok(())
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool").field("size", &self.size()).finish()
    }
}
