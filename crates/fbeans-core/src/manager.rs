#![forbid(unsafe_code)]

//! Listener registration and the notification driver.
//!
//! [`ListenerManager`] is what an observable embeds: it owns the
//! [`ListenerData`] and knows how to notify it. The observable passes
//! itself (as [`ObservableValue`]) into every call so listeners can read the
//! current value.
//!
//! # Invariants
//!
//! 1. No internal borrow is held while user code runs. Listener handles are
//!    cloned out of storage before the call, and removed handles are
//!    dropped after the borrow ends.
//! 2. Kinds are notified invalidation → change → structural, each in
//!    registration order.
//! 3. Listeners added during a notification are not called by it; listeners
//!    removed during a notification are not called after the removal.
//! 4. Change listeners never see `old == new`, and every change listener
//!    ends a notification having seen the final value.
//!
//! # Nested notifications
//!
//! A change listener that writes the observable starts a nested
//! notification. The nested level re-notifies only the listeners the outer
//! level already reached (they hold a stale value); the outer level then
//! continues with the fresh value. See [`crate::convergence`] for how a
//! reverting or fighting set of listeners is stopped.
//!
//! # Failure Modes
//!
//! - A panicking listener is reported to the uncaught handler and the rest
//!   are still notified (unless disabled in [`NotifyConfig`]).
//! - [`NonConvergence`](crate::NonConvergence) unwinds through every level
//!   to the code that started the outermost notification; storage is left
//!   unlocked and usable.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::config::NotifyConfig;
use crate::convergence::{
    self, NonConvergence, NonConvergenceReason, NotifyState, Outcome, ReentrancyGuard,
    is_non_convergence,
};
use crate::listener::{
    ChangeListener, InvalidationListener, Listener, ObservableValue, StructuralListener,
};
use crate::listener_data::{DataShape, ListenerData};
use crate::listener_list::ListenerList;
use crate::reaper;
use crate::uncaught::{self, ListenerError};

/// Listener storage plus notification driver for one observable.
///
/// `T` is the observed value, `C` the change record carried to structural
/// listeners (`()` for plain values).
pub struct ListenerManager<T: 'static, C: 'static = ()> {
    data: RefCell<ListenerData<T, C>>,
    reentrancy: Cell<usize>,
}

impl<T: 'static, C: 'static> Default for ListenerManager<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, C: 'static> fmt::Debug for ListenerManager<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerManager")
            .field("shape", &self.shape())
            .field("reentrancy", &self.reentrancy.get())
            .finish()
    }
}

/// What a notification has to do, cloned out of storage.
enum Dispatch<T: 'static, C: 'static> {
    Invalidation(InvalidationListener<T>),
    Change(ChangeListener<T>, T),
    Structural(StructuralListener<C>),
    Many,
}

impl<T: 'static, C: 'static> ListenerManager<T, C> {
    /// Create a manager with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RefCell::new(ListenerData::Empty),
            reentrancy: Cell::new(0),
        }
    }

    /// Register an invalidation listener.
    pub fn add_invalidation_listener(&self, listener: InvalidationListener<T>) {
        reaper::drain();
        self.data.borrow_mut().add_invalidation(listener);
    }

    /// Register a change listener. Its first old value is the current value
    /// of `observable`.
    pub fn add_change_listener(
        &self,
        observable: &dyn ObservableValue<T>,
        listener: ChangeListener<T>,
    ) {
        reaper::drain();
        let current = observable.value();
        self.data.borrow_mut().add_change(listener, current);
    }

    /// Register a structural listener.
    pub fn add_structural_listener(&self, listener: StructuralListener<C>) {
        reaper::drain();
        self.data.borrow_mut().add_structural(listener);
    }

    /// Unregister an invalidation listener. Returns false if it was absent.
    pub fn remove_invalidation_listener(&self, listener: &InvalidationListener<T>) -> bool {
        self.remove(&Listener::Invalidation(listener.clone()))
    }

    /// Unregister a change listener. Returns false if it was absent.
    pub fn remove_change_listener(&self, listener: &ChangeListener<T>) -> bool {
        self.remove(&Listener::Change(listener.clone()))
    }

    /// Unregister a structural listener. Returns false if it was absent.
    pub fn remove_structural_listener(&self, listener: &StructuralListener<C>) -> bool {
        self.remove(&Listener::Structural(listener.clone()))
    }

    fn remove(&self, target: &Listener<T, C>) -> bool {
        let removed = self.data.borrow_mut().remove(target);
        // Dropped here, after the borrow: the handle may own captures with
        // their own drop logic.
        removed.is_some()
    }

    /// Registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.data.borrow().len()
    }

    /// True when at least one listener is registered.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.data.borrow().is_empty()
    }

    /// Storage variant currently in use.
    #[must_use]
    pub fn shape(&self) -> DataShape {
        self.data.borrow().shape()
    }

    /// Current reentrancy depth of this observable's notifications.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.reentrancy.get()
    }

    fn with_list<R>(&self, f: impl FnOnce(&mut ListenerList<T, C>) -> R) -> Option<R> {
        let mut data = self.data.borrow_mut();
        data.as_list_mut().map(f)
    }
}

impl<T: Clone + PartialEq + 'static, C: 'static> ListenerManager<T, C> {
    /// Notify every listener that the value of `observable` may have changed.
    pub fn fire_value_changed(&self, observable: &dyn ObservableValue<T>) {
        self.fire(observable, None);
    }

    /// Notify every listener; structural listeners receive `change` when it
    /// is present.
    pub fn fire(&self, observable: &dyn ObservableValue<T>, change: Option<&C>) {
        reaper::drain();
        let config = NotifyConfig::global();
        let _depth = ReentrancyGuard::enter(&self.reentrancy, config.max_reentrancy, || {
            observable.name()
        });

        let dispatch = {
            let data = self.data.borrow();
            match &*data {
                ListenerData::Empty => return,
                ListenerData::Invalidation(l) => Dispatch::Invalidation(l.clone()),
                ListenerData::Change {
                    listener,
                    last_value,
                } => Dispatch::Change(listener.clone(), last_value.clone()),
                ListenerData::Structural(l) => Dispatch::Structural(l.clone()),
                ListenerData::Many(_) => Dispatch::Many,
            }
        };

        match dispatch {
            Dispatch::Invalidation(listener) => {
                self.call(observable, &config, || {
                    listener.invoke(observable);
                });
            }
            Dispatch::Structural(listener) => {
                if let Some(change) = change {
                    self.call(observable, &config, || {
                        listener.invoke(change);
                    });
                }
            }
            Dispatch::Change(listener, old) => {
                let new = observable.value();
                if new == old {
                    return;
                }
                self.cache_single(&listener, &new);
                self.call(observable, &config, || {
                    listener.invoke(observable, &old, &new);
                });
            }
            Dispatch::Many => self.fire_many(observable, change, &config),
        }
    }

    fn non_convergence(
        &self,
        observable: &dyn ObservableValue<T>,
        reason: NonConvergenceReason,
    ) -> ! {
        convergence::raise(NonConvergence::new(
            observable.name(),
            self.reentrancy.get(),
            reason,
        ))
    }

    fn cache_single(&self, listener: &ChangeListener<T>, new: &T) {
        if let ListenerData::Change {
            listener: current,
            last_value,
        } = &mut *self.data.borrow_mut()
        {
            if current.same(listener) {
                *last_value = new.clone();
            }
        }
    }

    fn fire_many(
        &self,
        observable: &dyn ObservableValue<T>,
        change: Option<&C>,
        config: &NotifyConfig,
    ) {
        let Some(mut level) = self.enter_level() else {
            return;
        };
        let Some((inv_len, chg_len, st_len)) = self.with_list(|list| {
            (
                list.invalidation_slots(),
                list.change_slots(),
                list.structural_slots(),
            )
        }) else {
            return;
        };
        let limit = level.limit;

        for i in 0..inv_len.min(limit) {
            let Some(listener) = self.with_list(|list| list.invalidation_at(i)).flatten() else {
                continue;
            };
            self.begin_call(i + 1);
            self.call(observable, config, || {
                listener.invoke(observable);
            });
        }

        if let Some(old) = level.old.clone() {
            let mut nested_aborted = false;
            let mut delivered = false;
            for j in 0..chg_len {
                let index = inv_len + j;
                if index >= limit {
                    break;
                }
                let Some(listener) = self.with_list(|list| list.change_at(j)).flatten() else {
                    continue;
                };
                if listener.is_expired() {
                    continue;
                }
                let new = observable.value();
                if new == old {
                    if nested_aborted {
                        self.non_convergence(observable, NonConvergenceReason::Oscillation);
                    }
                    if level.top && delivered {
                        self.non_convergence(observable, NonConvergenceReason::Reverted);
                    }
                    level.outcome = Outcome::Aborted;
                    if !level.top {
                        return;
                    }
                    // Settled back before any change listener ran; structural
                    // listeners still get the record.
                    break;
                }
                self.with_list(|list| list.set_latest(new.clone()));
                self.begin_call(index + 1);
                self.call(observable, config, || {
                    listener.invoke(observable, &old, &new);
                });
                delivered = true;
                if self.with_list(|list| list.state().outcome) == Some(Outcome::Aborted) {
                    if level.top {
                        self.non_convergence(observable, NonConvergenceReason::Reverted);
                    }
                    nested_aborted = true;
                }
            }
        }

        if let Some(change) = change {
            for k in 0..st_len {
                let index = inv_len + chg_len + k;
                if index >= limit {
                    break;
                }
                let Some(listener) = self.with_list(|list| list.structural_at(k)).flatten() else {
                    continue;
                };
                self.begin_call(index + 1);
                self.call(observable, config, || {
                    listener.invoke(change);
                });
            }
        }
    }

    fn enter_level(&self) -> Option<Level<'_, T, C>> {
        let mut data = self.data.borrow_mut();
        let list = data.as_list_mut()?;
        let top = !list.is_locked();
        if top {
            list.lock();
        }
        let saved = list.state();
        let limit = if top {
            list.locked_size()
        } else {
            saved.progress
        };
        Some(Level {
            data: &self.data,
            top,
            saved,
            limit,
            old: list.latest().cloned(),
            outcome: Outcome::Completed,
        })
    }

    fn begin_call(&self, progress: usize) {
        self.with_list(|list| {
            *list.state_mut() = NotifyState {
                progress,
                outcome: Outcome::Pending,
            };
        });
    }

    fn call(&self, observable: &dyn ObservableValue<T>, config: &NotifyConfig, f: impl FnOnce()) {
        let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) else {
            return;
        };
        if is_non_convergence(&*payload) || !config.report_listener_panics {
            panic::resume_unwind(payload);
        }
        uncaught::report(ListenerError::Panicked {
            observable: observable.name(),
            message: uncaught::panic_message(&*payload),
        });
    }
}

/// One notification level over a locked list. Restores the cross-level
/// state on exit, unwinding included.
struct Level<'a, T: 'static, C: 'static> {
    data: &'a RefCell<ListenerData<T, C>>,
    top: bool,
    saved: NotifyState,
    limit: usize,
    old: Option<T>,
    outcome: Outcome,
}

impl<T: 'static, C: 'static> Drop for Level<'_, T, C> {
    fn drop(&mut self) {
        let Ok(mut data) = self.data.try_borrow_mut() else {
            tracing::error!("listener storage borrowed while leaving a notification level");
            return;
        };
        if self.top {
            if let Some(list) = data.as_list_mut() {
                if list.is_locked() {
                    list.unlock();
                }
            }
            data.collapse();
        } else if let Some(list) = data.as_list_mut() {
            *list.state_mut() = NotifyState {
                progress: self.saved.progress,
                outcome: self.saved.outcome.merge(self.outcome),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    struct Cellish {
        value: Cell<i32>,
        listeners: ListenerManager<i32>,
    }

    impl ObservableValue<i32> for Cellish {
        fn value(&self) -> i32 {
            self.value.get()
        }

        fn name(&self) -> Option<String> {
            Some("cellish".into())
        }
    }

    impl Cellish {
        fn new(value: i32) -> Rc<Self> {
            Rc::new(Self {
                value: Cell::new(value),
                listeners: ListenerManager::new(),
            })
        }

        fn set(&self, value: i32) {
            if self.value.replace(value) != value {
                self.listeners.fire_value_changed(self);
            }
        }
    }

    #[test]
    fn empty_fire_is_noop() {
        let c = Cellish::new(0);
        c.set(1);
        assert_eq!(c.listeners.depth(), 0);
    }

    #[test]
    fn single_change_listener_gets_old_and_new() {
        let c = Cellish::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        c.listeners.add_change_listener(
            &*c,
            ChangeListener::new(move |_, old: &i32, new: &i32| log.borrow_mut().push((*old, *new))),
        );
        c.set(2);
        c.set(3);
        assert_eq!(*seen.borrow(), vec![(1, 2), (2, 3)]);
        assert_eq!(c.listeners.shape(), DataShape::Change);
    }

    #[test]
    fn kinds_are_notified_in_order() {
        let c = Cellish::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        c.listeners
            .add_change_listener(&*c, ChangeListener::new(move |_, _, _| l1.borrow_mut().push("change")));
        let l2 = Rc::clone(&log);
        c.listeners
            .add_invalidation_listener(InvalidationListener::new(move |_| l2.borrow_mut().push("inv")));
        c.set(5);
        assert_eq!(*log.borrow(), vec!["inv", "change"]);
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let c = Cellish::new(0);
        let reported = Rc::new(Cell::new(0));
        let reported_clone = Rc::clone(&reported);
        let _prev = uncaught::set_uncaught_handler(move |_| reported_clone.set(reported_clone.get() + 1));

        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        c.listeners
            .add_invalidation_listener(InvalidationListener::new(|_| panic!("listener failed")));
        c.listeners.add_invalidation_listener(InvalidationListener::new(move |_| {
            hits_clone.set(hits_clone.get() + 1);
        }));
        c.set(1);
        assert_eq!(hits.get(), 1);
        assert_eq!(reported.get(), 1);
        assert!(matches!(c.listeners.shape(), DataShape::Many { locked: false, .. }));
        uncaught::take_uncaught_handler();
    }

    #[test]
    fn removal_returns_presence() {
        let c = Cellish::new(0);
        let l = InvalidationListener::new(|_| {});
        c.listeners.add_invalidation_listener(l.clone());
        assert!(c.listeners.remove_invalidation_listener(&l));
        assert!(!c.listeners.remove_invalidation_listener(&l));
        assert!(!c.listeners.has_listeners());
    }
}
