// src/exec/lease.rs

//! Bounded pool of "running as a worker" permits.
//!
//! A lease does not admit individual tasks; it marks the current thread as a
//! worker for the lifetime of a [`WorkerLease`]. Graph queries check that
//! mark and refuse to run anywhere else.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::errors::LeaseError;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Ids of the services the current thread holds a lease from, innermost last.
    static HELD: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug)]
pub struct WorkerLeaseService {
    id: u64,
    max_workers: usize,
    active: Mutex<usize>,
    released: Condvar,
}

impl WorkerLeaseService {
    /// Create a service handing out at most `max_workers` concurrent leases.
    /// A size of 0 is treated as 1.
    pub fn new(max_workers: usize) -> Self {
        Self {
            id: NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed),
            max_workers: max_workers.max(1),
            active: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Leases currently held across all threads.
    pub fn active_leases(&self) -> usize {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a lease is free and take it.
    pub fn acquire(&self) -> WorkerLease<'_> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        while *active >= self.max_workers {
            trace!(active = *active, max = self.max_workers, "waiting for worker lease");
            active = self
                .released
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *active += 1;
        debug!(active = *active, max = self.max_workers, "worker lease acquired");
        drop(active);

        WorkerLease::register(self)
    }

    /// Take a lease only if one is free right now.
    pub fn try_acquire(&self) -> Option<WorkerLease<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active >= self.max_workers {
            return None;
        }
        *active += 1;
        drop(active);

        Some(WorkerLease::register(self))
    }

    /// Run `f` while holding a lease.
    ///
    /// If the current thread already holds a lease from this service, `f` runs
    /// directly under that lease. Otherwise this blocks for a free one, which
    /// is released when `f` returns or unwinds.
    pub fn run_as_worker<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.is_worker_thread() {
            return f();
        }
        let _lease = self.acquire();
        f()
    }

    pub fn is_worker_thread(&self) -> bool {
        HELD.with(|held| held.borrow().contains(&self.id))
    }

    pub fn assert_worker(&self) -> Result<(), LeaseError> {
        if self.is_worker_thread() {
            Ok(())
        } else {
            Err(LeaseError::NotAWorker)
        }
    }

    fn release(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active = active.saturating_sub(1);
        debug!(active = *active, max = self.max_workers, "worker lease released");
        drop(active);
        self.released.notify_one();
    }
}

/// Proof that the current thread is a worker. Released on drop.
///
/// Leases are tied to the thread that took them and cannot be sent elsewhere.
#[derive(Debug)]
pub struct WorkerLease<'a> {
    service: &'a WorkerLeaseService,
    _not_send: PhantomData<*const ()>,
}

impl<'a> WorkerLease<'a> {
    fn register(service: &'a WorkerLeaseService) -> Self {
        HELD.with(|held| held.borrow_mut().push(service.id));
        Self {
            service,
            _not_send: PhantomData,
        }
    }
}

impl Drop for WorkerLease<'_> {
    fn drop(&mut self) {
        let id = self.service.id;
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&h| h == id) {
                held.remove(pos);
            }
        });
        self.service.release();
    }
}
