// src/exec/mod.rs

//! Execution layer.
//!
//! - [`lease`] bounds how many threads may run a build at once and lets plan
//!   queries check that they are on one of those threads.
//! - [`backend`] provides the `Executor` trait and the tokio-backed
//!   implementation used by the binary.
//! - [`pool`] is a plain fixed-size thread pool, handy for embedding and
//!   tests that do not want a tokio runtime.
//! - [`action`] defines what a task does when it runs.
//! - [`command`] is the shell-command action used for config-defined tasks.

pub mod action;
pub mod backend;
pub mod command;
pub mod lease;
pub mod pool;

pub use action::{FnAction, TaskAction, TaskContext, action_fn};
pub use backend::{Executor, Job, TokioExecutor};
pub use command::CommandAction;
pub use lease::{WorkerLease, WorkerLeaseService};
pub use pool::ThreadPool;
