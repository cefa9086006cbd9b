#![forbid(unsafe_code)]

//! Deferred cleanup of dropped subscriptions.
//!
//! Dropping a [`Subscription`](crate::Subscription) can happen anywhere,
//! including inside a listener while the observable it unsubscribes from
//! is mid-notification. Running the removal there would reenter the
//! listener storage, so the cleanup is queued instead and run at the next
//! safe point:
//!
//! - the start of every notification,
//! - every listener registration,
//! - an explicit [`drain`].
//!
//! The queue is per thread and created on first use. Observables are not
//! `Send`, so every cleanup runs on the thread that created it.
//!
//! # Failure Modes
//!
//! - A panicking cleanup is caught, logged with `tracing::warn!` and counted
//!   in [`ReaperStats::failures`]; the rest of the queue still runs.
//! - Cleanups queued while the thread is shutting down are dropped without
//!   running.
//! - Nothing drains the queue on its own. A thread that stops notifying and
//!   registering listeners keeps its dropped subscriptions registered until
//!   it calls [`drain`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use crate::uncaught::panic_message;

type Cleanup = Box<dyn FnOnce()>;

/// Counters for the current thread's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaperStats {
    /// Cleanups run since the thread started.
    pub reaped: u64,
    /// Cleanups that panicked.
    pub failures: u64,
    /// Cleanups waiting to run.
    pub pending: usize,
}

struct Reaper {
    queue: RefCell<VecDeque<Cleanup>>,
    draining: Cell<bool>,
    reaped: Cell<u64>,
    failures: Cell<u64>,
}

impl Reaper {
    fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            reaped: Cell::new(0),
            failures: Cell::new(0),
        }
    }

    fn drain(&self) -> usize {
        if self.draining.replace(true) {
            return 0;
        }
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(cleanup) = next else {
                break;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                self.failures.set(self.failures.get() + 1);
                tracing::warn!(
                    message = %panic_message(&*payload),
                    "subscription cleanup panicked"
                );
            }
            ran += 1;
        }
        self.reaped.set(self.reaped.get() + ran as u64);
        self.draining.set(false);
        if ran > 0 {
            tracing::debug!(ran, "reaped dropped subscriptions");
        }
        ran
    }
}

thread_local! {
    static REAPER: Reaper = Reaper::new();
}

/// Queue a cleanup to run at the next safe point on this thread.
pub fn enqueue(cleanup: impl FnOnce() + 'static) {
    let cleanup: Cleanup = Box::new(cleanup);
    let queued = REAPER.try_with(|reaper| reaper.queue.borrow_mut().push_back(cleanup));
    if queued.is_err() {
        tracing::trace!("thread shutting down, subscription cleanup dropped");
    }
}

/// Run every queued cleanup, including ones queued by cleanups.
///
/// Returns how many ran. A nested call made by a running cleanup returns 0
/// and leaves the work to the outer call.
pub fn drain() -> usize {
    REAPER.try_with(Reaper::drain).unwrap_or(0)
}

/// Number of cleanups waiting on this thread.
#[must_use]
pub fn pending() -> usize {
    REAPER
        .try_with(|reaper| reaper.queue.borrow().len())
        .unwrap_or(0)
}

/// Counters for this thread.
#[must_use]
pub fn stats() -> ReaperStats {
    REAPER
        .try_with(|reaper| ReaperStats {
            reaped: reaper.reaped.get(),
            failures: reaper.failures.get(),
            pending: reaper.queue.borrow().len(),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn drain_runs_in_fifo_order() {
        drain();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            enqueue(move || log.borrow_mut().push(i));
        }
        assert_eq!(pending(), 3);
        assert_eq!(drain(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(pending(), 0);
    }

    #[test]
    fn queued_cleanup_waits_for_a_safe_point() {
        drain();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        enqueue(move || flag.set(true));
        assert!(!ran.get());
        assert_eq!(pending(), 1);
        assert_eq!(drain(), 1);
        assert!(ran.get());
    }

    #[test]
    fn cleanups_queued_during_drain_run_in_same_pass() {
        drain();
        let hits = Rc::new(Cell::new(0));
        let hits_outer = Rc::clone(&hits);
        enqueue(move || {
            let hits_inner = Rc::clone(&hits_outer);
            hits_outer.set(hits_outer.get() + 1);
            enqueue(move || hits_inner.set(hits_inner.get() + 1));
            // Nested drain is a no-op.
            assert_eq!(drain(), 0);
        });
        assert_eq!(drain(), 2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn panicking_cleanup_is_counted_and_skipped() {
        drain();
        let before = stats();
        let ran_after = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran_after);
        enqueue(|| panic!("cleanup failed"));
        enqueue(move || flag.set(true));
        assert_eq!(drain(), 2);
        assert!(ran_after.get());
        let after = stats();
        assert_eq!(after.failures, before.failures + 1);
        assert_eq!(after.reaped, before.reaped + 2);
    }
}
