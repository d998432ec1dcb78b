// src/engine/state.rs

use std::fmt;

/// Lifecycle of a [`super::BuildController`].
///
/// There is exactly one path through the states and no way back:
/// `DiscoveringTasks → ReadyToRun → RunningTasks → Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Tasks are being registered, scheduled and filtered.
    DiscoveringTasks,
    /// The graph is frozen and waiting for `start_execution`.
    ReadyToRun,
    /// A worker is running the plan.
    RunningTasks,
    /// The run completed (successfully or not) and the callback has fired or
    /// is about to.
    Finished,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::DiscoveringTasks => "discovering tasks",
            ControllerState::ReadyToRun => "ready to run",
            ControllerState::RunningTasks => "running tasks",
            ControllerState::Finished => "finished",
        };
        f.write_str(name)
    }
}
