// src/graph/stop.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag telling a running plan to unwind.
///
/// Cloning is cheap and every clone observes the same flag, so a handle can
/// be passed to another thread (e.g. a Ctrl-C listener) while the run is in
/// flight. Requesting a stop never interrupts the task that is currently
/// executing; the plan checks the flag before starting each task.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
