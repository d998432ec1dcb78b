//! Task actions and completion helpers that let tests observe a run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use buildgraph::engine::ExecutionResult;
use buildgraph::exec::{TaskAction, action_fn};
use crossbeam_channel::{Receiver, Sender};

const WAIT: Duration = Duration::from_secs(5);

/// Shared log of executed task paths, in execution order.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An action that appends its task path to the log.
    pub fn action(&self) -> Arc<dyn TaskAction> {
        let log = Arc::clone(&self.log);
        action_fn(move |ctx| {
            log.lock().unwrap().push(ctx.task().to_string());
            Ok(())
        })
    }

    /// Records, then fails with `message`.
    pub fn failing(&self, message: &'static str) -> Arc<dyn TaskAction> {
        let log = Arc::clone(&self.log);
        action_fn(move |ctx| {
            log.lock().unwrap().push(ctx.task().to_string());
            bail!(message)
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

pub fn panicking_action(message: &'static str) -> Arc<dyn TaskAction> {
    action_fn(move |_ctx| panic!("{message}"))
}

/// Action that blocks until the test releases it (or 5s pass).
///
/// `entered()` lets the test wait until the action has actually started.
#[derive(Debug, Clone)]
pub struct Gate {
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
}

impl Gate {
    pub fn new() -> Self {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        Self {
            release_tx,
            release_rx,
            entered_tx,
            entered_rx,
        }
    }

    pub fn action(&self) -> Arc<dyn TaskAction> {
        let release = self.release_rx.clone();
        let entered = self.entered_tx.clone();
        action_fn(move |_ctx| {
            let _ = entered.send(());
            if release.recv_timeout(WAIT).is_err() {
                bail!("gate was never released");
            }
            Ok(())
        })
    }

    pub fn wait_entered(&self) {
        self.entered_rx
            .recv_timeout(WAIT)
            .expect("gated action never started");
    }

    pub fn release(&self) {
        self.release_tx.send(()).unwrap();
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects completion callbacks so a test can wait on them.
#[derive(Debug, Clone)]
pub struct CompletionLatch {
    tx: Sender<ExecutionResult>,
    rx: Receiver<ExecutionResult>,
    calls: Arc<AtomicUsize>,
}

impl CompletionLatch {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A callback suitable for `start_execution`.
    pub fn callback(&self) -> impl FnOnce(ExecutionResult) + Send + 'static {
        let tx = self.tx.clone();
        let calls = Arc::clone(&self.calls);
        move |result| {
            calls.fetch_add(1, Ordering::SeqCst);
            tx.send(result).unwrap();
        }
    }

    /// Block for the next result.
    pub fn wait(&self) -> ExecutionResult {
        self.rx
            .recv_timeout(WAIT)
            .expect("completion callback did not fire within 5 seconds")
    }

    /// Number of times any callback from this latch has fired.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `true` if no further result shows up within `within`.
    pub fn stays_quiet(&self, within: Duration) -> bool {
        self.rx.recv_timeout(within).is_err()
    }
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}
