// src/engine/mod.rs

//! Orchestration engine for buildgraph.
//!
//! - [`controller`] holds [`BuildController`], the state machine callers drive
//!   from task registration through to completion.
//! - [`state`] is the controller's lifecycle enum.
//! - [`outcome`] describes what a finished run hands to its completion
//!   callback.
//! - `completion` makes sure that callback fires once even when an executor
//!   drops the run.

mod completion;
pub mod controller;
pub mod outcome;
pub mod state;

pub use controller::BuildController;
pub use outcome::{ExecutionFailure, ExecutionResult, RunReport, TaskFailure};
pub use state::ControllerState;
