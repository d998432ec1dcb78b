// src/engine/completion.rs

//! Exactly-once delivery of a run's result.
//!
//! The job handed to an executor owns a [`Completion`]. Running the job
//! completes it normally. If the executor drops the job without running it,
//! the completion fires from `Drop` with [`ExecutionFailure::Abandoned`].
//!
//! A drop that happens while the controller is still inside
//! `Executor::execute` is parked instead of delivered. Only once `execute`
//! returns does the controller know whether the job was rejected (no
//! callback, the error is returned) or accepted and discarded (callback
//! fires).

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::engine::outcome::{ExecutionFailure, ExecutionResult};
use crate::engine::state::ControllerState;

struct Handoff<F> {
    submitting: bool,
    parked: Option<F>,
}

/// The controller's end of a submission.
pub(crate) struct Submission<F> {
    handoff: Arc<Mutex<Handoff<F>>>,
}

/// The job's end: carries the callback to wherever the run happens.
pub(crate) struct Completion<F>
where
    F: FnOnce(ExecutionResult),
{
    on_complete: Option<F>,
    handoff: Arc<Mutex<Handoff<F>>>,
    state: Arc<Mutex<ControllerState>>,
}

pub(crate) fn submission<F>(on_complete: F, state: Arc<Mutex<ControllerState>>) -> (Submission<F>, Completion<F>)
where
    F: FnOnce(ExecutionResult),
{
    let handoff = Arc::new(Mutex::new(Handoff {
        submitting: true,
        parked: None,
    }));
    let completion = Completion {
        on_complete: Some(on_complete),
        handoff: Arc::clone(&handoff),
        state,
    };
    (Submission { handoff }, completion)
}

/// Mark the controller finished, then hand `result` to the callback.
pub(crate) fn deliver<F>(state: &Mutex<ControllerState>, on_complete: F, result: ExecutionResult)
where
    F: FnOnce(ExecutionResult),
{
    *state.lock().unwrap_or_else(PoisonError::into_inner) = ControllerState::Finished;
    match &result {
        Ok(report) => info!(%report, "build finished"),
        Err(failure) => warn!(error = %failure, "build finished with failures"),
    }
    on_complete(result);
}

impl<F> Submission<F> {
    /// End the submission window. Returns the callback if the executor
    /// dropped the job before `execute` returned.
    pub(crate) fn close(self) -> Option<F> {
        let mut handoff = self.handoff.lock().unwrap_or_else(PoisonError::into_inner);
        handoff.submitting = false;
        handoff.parked.take()
    }
}

impl<F> Completion<F>
where
    F: FnOnce(ExecutionResult),
{
    pub(crate) fn complete(mut self, result: ExecutionResult) {
        if let Some(on_complete) = self.on_complete.take() {
            deliver(&self.state, on_complete, result);
        }
    }
}

impl<F> Drop for Completion<F>
where
    F: FnOnce(ExecutionResult),
{
    fn drop(&mut self) {
        let Some(on_complete) = self.on_complete.take() else {
            return;
        };

        let mut handoff = self.handoff.lock().unwrap_or_else(PoisonError::into_inner);
        if handoff.submitting {
            handoff.parked = Some(on_complete);
            return;
        }
        drop(handoff);

        warn!("executor dropped the build run before it started");
        deliver(&self.state, on_complete, Err(ExecutionFailure::Abandoned));
    }
}
