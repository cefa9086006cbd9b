#![forbid(unsafe_code)]

//! Two properties that keep each other's value.
//!
//! A [`BidirectionalLink`] registers one invalidation listener on each
//! property. When either changes, the link copies the value across under an
//! `updating` flag so the copy does not echo back.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Other side rejects the value | Source rolled back to the last synchronized value, [`BindingError::PropagationFailed`] reported |
//! | Rollback rejected too | Link removed, [`BindingError::RollbackFailed`] reported |
//! | Other side settles on a different value | Settled value pushed back to the source |
//! | Listeners on both sides keep fighting | [`NonConvergence`](fbeans_core::NonConvergence) |
//! | One side dropped | Link removes itself from the survivor |
//!
//! Failures are reported through the uncaught-error channel, the only
//! channel a listener has.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fbeans_core::InvalidationListener;
use fbeans_core::uncaught::{self, ListenerError};

use crate::error::{BindingError, PropertyError};
use crate::property::{Property, WeakProperty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

/// Bidirectional binding between two properties, owned by both.
pub(crate) struct BidirectionalLink<T: 'static> {
    a: WeakProperty<T>,
    b: WeakProperty<T>,
    a_listener: InvalidationListener<T>,
    b_listener: InvalidationListener<T>,
    updating: Cell<bool>,
    last_synced: RefCell<T>,
}

/// Sets a flag for its lifetime, unwinding included.
struct Updating<'a>(&'a Cell<bool>);

impl<'a> Updating<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Updating<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: 'static> BidirectionalLink<T> {
    fn connects(&self, first: &Property<T>, second: &Property<T>) -> bool {
        (self.a.points_to(first) && self.b.points_to(second))
            || (self.a.points_to(second) && self.b.points_to(first))
    }

    /// Unregister from both properties.
    fn detach(&self) {
        for (side, listener) in [(&self.a, &self.a_listener), (&self.b, &self.b_listener)] {
            if let Some(property) = side.upgrade() {
                property.remove_invalidation_listener(listener);
                property
                    .links()
                    .borrow_mut()
                    .retain(|link| !std::ptr::eq(Rc::as_ptr(link), self));
            }
        }
        tracing::debug!("bidirectional binding removed");
    }
}

impl<T: Clone + PartialEq + 'static> BidirectionalLink<T> {
    fn propagate(&self, from: Side) {
        if self.updating.get() {
            return;
        }
        let (source, target) = match from {
            Side::A => (&self.a, &self.b),
            Side::B => (&self.b, &self.a),
        };
        let (Some(source), Some(target)) = (source.upgrade(), target.upgrade()) else {
            self.detach();
            return;
        };

        let value = source.get();
        let pushed = {
            let _updating = Updating::enter(&self.updating);
            match target.try_set(value.clone()) {
                Ok(()) => Ok(target.get()),
                Err(cause) => Err(self.roll_back(&source, cause)),
            }
        };

        match pushed {
            Ok(settled) => {
                *self.last_synced.borrow_mut() = settled.clone();
                if settled != value {
                    // A listener on the target moved it on; bring the source
                    // along. Not guarded, so a fight reaches the convergence
                    // guard instead of silently diverging.
                    if let Err(cause) = source.try_set(settled) {
                        report(BindingError::PropagationFailed { cause });
                    }
                }
            }
            Err(error) => report(error),
        }
    }

    fn roll_back(&self, source: &Property<T>, cause: PropertyError) -> BindingError {
        let last = self.last_synced.borrow().clone();
        match source.try_set(last) {
            Ok(()) => BindingError::PropagationFailed { cause },
            Err(rollback) => {
                self.detach();
                BindingError::RollbackFailed { cause, rollback }
            }
        }
    }
}

fn report(error: BindingError) {
    tracing::warn!(error = %error, "bidirectional binding failed");
    uncaught::report(ListenerError::Failed(Box::new(error)));
}

fn find_link<T: 'static>(a: &Property<T>, b: &Property<T>) -> Option<Rc<BidirectionalLink<T>>> {
    a.links()
        .borrow()
        .iter()
        .find(|link| link.connects(a, b))
        .cloned()
}

/// Bind `a` and `b` so each follows the other. `a` adopts `b`'s value.
///
/// Fails before any change if `a` and `b` are the same property or already
/// bound to each other, or if `a` refuses `b`'s value.
pub fn bind_bidirectional<T: Clone + PartialEq + 'static>(
    a: &Property<T>,
    b: &Property<T>,
) -> Result<(), BindingError> {
    if a.ptr_eq(b) {
        return Err(BindingError::SelfBinding);
    }
    if find_link(a, b).is_some() {
        return Err(BindingError::AlreadyBound);
    }
    let initial = b.get();
    a.try_set(initial.clone())
        .map_err(|cause| BindingError::PropagationFailed { cause })?;

    let link = Rc::new_cyclic(|weak: &Weak<BidirectionalLink<T>>| {
        let from_a = Weak::clone(weak);
        let from_b = Weak::clone(weak);
        BidirectionalLink {
            a: a.downgrade(),
            b: b.downgrade(),
            a_listener: InvalidationListener::new(move |_| {
                if let Some(link) = from_a.upgrade() {
                    link.propagate(Side::A);
                }
            }),
            b_listener: InvalidationListener::new(move |_| {
                if let Some(link) = from_b.upgrade() {
                    link.propagate(Side::B);
                }
            }),
            updating: Cell::new(false),
            last_synced: RefCell::new(initial),
        }
    });
    a.add_invalidation_listener(link.a_listener.clone());
    b.add_invalidation_listener(link.b_listener.clone());
    a.links().borrow_mut().push(Rc::clone(&link));
    b.links().borrow_mut().push(link);
    tracing::debug!(a = ?a.name(), b = ?b.name(), "bidirectional binding established");
    Ok(())
}

/// Remove the bidirectional binding between `a` and `b`, in either order.
/// Returns false if there was none.
pub fn unbind_bidirectional<T: 'static>(a: &Property<T>, b: &Property<T>) -> bool {
    match find_link(a, b) {
        Some(link) => {
            link.detach();
            true
        }
        None => false,
    }
}

/// True when `a` and `b` are bidirectionally bound.
#[must_use]
pub fn is_bound_bidirectionally<T: 'static>(a: &Property<T>, b: &Property<T>) -> bool {
    find_link(a, b).is_some()
}
