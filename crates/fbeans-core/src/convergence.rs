#![forbid(unsafe_code)]

//! Convergence guard for listeners that modify the value they observe.
//!
//! A change listener may write to the observable that is notifying it. That
//! write starts a *nested* notification while the enclosing loop is still
//! running. The enclosing loop and the nested one talk through a
//! [`NotifyState`] stored in the locked listener list:
//!
//! - `progress`: how many listeners the enclosing level already notified.
//!   A nested level only re-notifies those (they hold a now-stale value);
//!   listeners past `progress` are reached by the enclosing loop with the
//!   freshest value. Each level saves `progress` on entry and restores it on
//!   exit.
//! - `outcome`: what the most recent nested level reported when it exited.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Nested level: re-read value equals the level's old value | Level stops early, reports [`Outcome::Aborted`] |
//! | Same, after a nested level at this level already aborted | [`NonConvergence`] (oscillation) |
//! | Top level: value reverted after a change listener ran, or a nested level aborted | [`NonConvergence`] (reverted) |
//! | Top level: value already back before any change listener ran | Change listeners skipped, structural ones still notified |
//! | Reentrant notifications of one observable exceed the limit | [`NonConvergence`] (reentrancy limit) |
//!
//! [`NonConvergence`] is raised by unwinding with the error as payload.
//! Listener call sites re-raise it instead of reporting it, so it reaches
//! the code that started the outermost notification. Use
//! [`catch_non_convergence`] to turn it back into a `Result`.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Result a nested notification level reports to its enclosing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// No nested level ran since the enclosing level last called a listener.
    #[default]
    Pending,
    /// A nested level ran and finished normally.
    Completed,
    /// A nested level stopped early because the value reverted.
    Aborted,
}

impl Outcome {
    /// Combine two outcomes; `Aborted` dominates `Completed` dominates `Pending`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Aborted, _) | (_, Self::Aborted) => Self::Aborted,
            (Self::Completed, _) | (_, Self::Completed) => Self::Completed,
            _ => Self::Pending,
        }
    }
}

/// Cross-level notification state held by a locked listener list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyState {
    /// Listeners already notified by the level currently iterating.
    pub progress: usize,
    /// Outcome reported by the last nested level.
    pub outcome: Outcome,
}

/// Why a notification was judged non-convergent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonConvergenceReason {
    /// The value reverted twice at the same level: listeners are fighting.
    Oscillation,
    /// A revert reached the outermost notification, which has no enclosing
    /// level to absorb it.
    Reverted,
    /// One observable re-entered its own notification too many times.
    ReentrancyLimit { limit: usize },
}

/// Listeners failed to agree on a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonConvergence {
    observable: Option<String>,
    depth: usize,
    reason: NonConvergenceReason,
}

impl NonConvergence {
    /// Build the error.
    #[must_use]
    pub fn new(observable: Option<String>, depth: usize, reason: NonConvergenceReason) -> Self {
        Self {
            observable,
            depth,
            reason,
        }
    }

    /// Name of the observable whose notification failed, if it has one.
    #[must_use]
    pub fn observable(&self) -> Option<&str> {
        self.observable.as_deref()
    }

    /// Reentrancy depth at the point of failure.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// What tripped the guard.
    #[must_use]
    pub fn reason(&self) -> NonConvergenceReason {
        self.reason
    }
}

impl fmt::Display for NonConvergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.observable.as_deref().unwrap_or("<unnamed>");
        match self.reason {
            NonConvergenceReason::Oscillation => write!(
                f,
                "non-converging value detected in value modifying listeners on {name} (depth {})",
                self.depth
            ),
            NonConvergenceReason::Reverted => write!(
                f,
                "value modifying listeners on {name} reverted the value being delivered"
            ),
            NonConvergenceReason::ReentrancyLimit { limit } => write!(
                f,
                "value modifying listeners on {name} re-entered notification more than {limit} times"
            ),
        }
    }
}

impl std::error::Error for NonConvergence {}

/// Unwind with `error` as the payload.
pub fn raise(error: NonConvergence) -> ! {
    tracing::error!(error = %error, "notification did not converge");
    panic::panic_any(error)
}

/// True when a caught panic payload is a [`NonConvergence`].
#[must_use]
pub fn is_non_convergence(payload: &(dyn Any + Send)) -> bool {
    payload.is::<NonConvergence>()
}

/// Run `f`, turning a [`NonConvergence`] unwind into `Err`.
///
/// Any other panic keeps unwinding.
pub fn catch_non_convergence<R>(f: impl FnOnce() -> R) -> Result<R, NonConvergence> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<NonConvergence>() {
            Ok(error) => Err(*error),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Counts reentrant notifications of a single observable.
///
/// The counter is decremented on drop, unwinding included.
pub(crate) struct ReentrancyGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> ReentrancyGuard<'a> {
    pub(crate) fn enter(
        depth: &'a Cell<usize>,
        limit: usize,
        name: impl FnOnce() -> Option<String>,
    ) -> Self {
        let current = depth.get() + 1;
        depth.set(current);
        let guard = Self { depth };
        if current > limit {
            raise(NonConvergence::new(
                name(),
                current,
                NonConvergenceReason::ReentrancyLimit { limit },
            ));
        }
        guard
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth.get()
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}
