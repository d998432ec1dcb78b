// src/graph/mod.rs

//! Work graph representation, cycle detection and the frozen execution plan.
//!
//! - [`node`] holds the arena entry for a single task.
//! - [`work_graph`] owns the arena, the entry/planned sets, filters and
//!   finalization actions, and turns them into an [`ExecutionPlan`].
//! - [`cycles`] is the detect-then-describe cycle check run at finalization.
//! - [`render`] formats dependency loops for diagnostics.
//! - [`plan`] is the immutable plan and the code that walks it.
//! - [`stop`] is the shared cancellation flag.

pub(crate) mod cycles;
pub mod node;
pub mod plan;
pub mod render;
pub mod stop;
pub mod work_graph;

pub use node::TaskNode;
pub use plan::{ExecutionPlan, PlanDraft, PlanQuery, PlanStep, SkipReason};
pub use stop::StopSignal;
pub use work_graph::{Finalization, TaskDefinition, TaskFilter, WorkGraph, WorkGraphBuilder};
