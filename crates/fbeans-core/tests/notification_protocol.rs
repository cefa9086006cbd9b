//! Notification protocol tests: listeners that mutate registrations or the
//! observed value while being notified.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fbeans_core::{
    ChangeListener, DataShape, InvalidationListener, ListenerManager, NonConvergenceReason,
    ObservableValue, Subscription, catch_non_convergence, reaper,
};

struct Counter {
    value: Cell<i32>,
    listeners: ListenerManager<i32>,
}

impl ObservableValue<i32> for Counter {
    fn value(&self) -> i32 {
        self.value.get()
    }

    fn name(&self) -> Option<String> {
        Some("counter".into())
    }
}

impl Counter {
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

type Log = Rc<RefCell<Vec<(i32, i32)>>>;

fn logging_listener(counter: &Rc<Counter>, log: &Log) -> ChangeListener<i32> {
    let log = Rc::clone(log);
    let listener =
        ChangeListener::new(move |_, old: &i32, new: &i32| log.borrow_mut().push((*old, *new)));
    counter.listeners.add_change_listener(&**counter, listener.clone());
    listener
}

fn writing_listener(
    counter: &Rc<Counter>,
    log: &Log,
    rule: impl Fn(i32) -> Option<i32> + 'static,
) -> ChangeListener<i32> {
    let log = Rc::clone(log);
    let target = Rc::downgrade(counter);
    let listener = ChangeListener::new(move |_, old: &i32, new: &i32| {
        log.borrow_mut().push((*old, *new));
        if let (Some(next), Some(target)) = (rule(*new), target.upgrade()) {
            target.set(next);
        }
    });
    counter.listeners.add_change_listener(&**counter, listener.clone());
    listener
}

#[test]
fn listener_added_during_notification_waits_for_next_one() {
    let c = Counter::new(0);
    let late_hits = Rc::new(Cell::new(0));
    let added = Rc::new(Cell::new(false));

    let target = Rc::downgrade(&c);
    let hits = Rc::clone(&late_hits);
    let flag = Rc::clone(&added);
    c.listeners.add_invalidation_listener(InvalidationListener::new(move |_| {
        if flag.replace(true) {
            return;
        }
        if let Some(c) = target.upgrade() {
            let hits = Rc::clone(&hits);
            c.listeners.add_invalidation_listener(InvalidationListener::new(move |_| {
                hits.set(hits.get() + 1);
            }));
        }
    }));
    c.listeners.add_invalidation_listener(InvalidationListener::new(|_| {}));

    c.set(1);
    assert_eq!(late_hits.get(), 0);
    assert_eq!(c.listeners.listener_count(), 3);
    c.set(2);
    assert_eq!(late_hits.get(), 1);
}

#[test]
fn listener_removed_during_notification_is_skipped() {
    let c = Counter::new(0);
    let second_hits = Rc::new(Cell::new(0));
    let hits = Rc::clone(&second_hits);
    let second = InvalidationListener::new(move |_| hits.set(hits.get() + 1));

    let target = Rc::downgrade(&c);
    let victim = second.clone();
    c.listeners.add_invalidation_listener(InvalidationListener::new(move |_| {
        if let Some(c) = target.upgrade() {
            c.listeners.remove_invalidation_listener(&victim);
        }
    }));
    c.listeners.add_invalidation_listener(second);

    c.set(1);
    assert_eq!(second_hits.get(), 0);
    assert_eq!(c.listeners.shape(), DataShape::Invalidation);
}

#[test]
fn self_removal_collapses_after_notification() {
    let c = Counter::new(0);
    let target = Rc::downgrade(&c);
    let me: Rc<RefCell<Option<InvalidationListener<i32>>>> = Rc::new(RefCell::new(None));
    let me_clone = Rc::clone(&me);
    let listener = InvalidationListener::new(move |_| {
        let handle = me_clone.borrow_mut().take();
        if let (Some(c), Some(handle)) = (target.upgrade(), handle) {
            c.listeners.remove_invalidation_listener(&handle);
        }
    });
    *me.borrow_mut() = Some(listener.clone());
    c.listeners.add_invalidation_listener(listener);
    c.listeners.add_invalidation_listener(InvalidationListener::new(|_| {}));
    drop(me);

    c.set(1);
    assert_eq!(c.listeners.shape(), DataShape::Invalidation);
}

#[test]
fn clamping_listener_leaves_everyone_on_final_value() {
    let c = Counter::new(0);
    let clamp_log: Log = Rc::default();
    let plain_log: Log = Rc::default();
    writing_listener(&c, &clamp_log, |v| (v > 10).then_some(10));
    logging_listener(&c, &plain_log);

    c.set(15);
    assert_eq!(c.value(), 10);
    assert_eq!(*clamp_log.borrow(), vec![(0, 15), (15, 10)]);
    assert_eq!(*plain_log.borrow(), vec![(0, 10)]);
}

#[test]
fn reverting_listener_raises_non_convergence() {
    let c = Counter::new(0);
    let revert_log: Log = Rc::default();
    let plain_log: Log = Rc::default();
    writing_listener(&c, &revert_log, |v| (v != 0).then_some(0));
    logging_listener(&c, &plain_log);

    let counter = Rc::clone(&c);
    let err = catch_non_convergence(move || counter.set(5)).unwrap_err();
    assert_eq!(err.reason(), NonConvergenceReason::Reverted);
    assert_eq!(c.value(), 0);
    assert_eq!(*revert_log.borrow(), vec![(0, 5), (5, 0)]);
    assert!(plain_log.borrow().is_empty());
    assert_eq!(c.listeners.depth(), 0);
    assert!(matches!(c.listeners.shape(), DataShape::Many { locked: false, .. }));
}

#[test]
fn listeners_undoing_each_other_raise_non_convergence() {
    let c = Counter::new(0);
    let first_log: Log = Rc::default();
    let second_log: Log = Rc::default();
    writing_listener(&c, &first_log, |v| (v == 1).then_some(2));
    writing_listener(&c, &second_log, |v| (v == 2).then_some(1));

    let counter = Rc::clone(&c);
    let err = catch_non_convergence(move || counter.set(1)).unwrap_err();
    assert_eq!(err.reason(), NonConvergenceReason::Reverted);
    assert_eq!(*first_log.borrow(), vec![(0, 1), (1, 2), (2, 1), (1, 2)]);
    assert_eq!(*second_log.borrow(), vec![(0, 2)]);
    assert_eq!(c.listeners.depth(), 0);
    assert!(matches!(c.listeners.shape(), DataShape::Many { locked: false, .. }));
}

#[test]
fn revert_before_any_change_listener_is_quiet() {
    let c = Counter::new(0);
    let plain_log: Log = Rc::default();
    let target = Rc::downgrade(&c);
    c.listeners.add_invalidation_listener(InvalidationListener::new(move |_| {
        if let Some(target) = target.upgrade() {
            if target.value() != 0 {
                target.set(0);
            }
        }
    }));
    logging_listener(&c, &plain_log);

    c.set(5);
    assert_eq!(c.value(), 0);
    assert!(plain_log.borrow().is_empty());
    assert_eq!(c.listeners.depth(), 0);
}

#[test]
fn fighting_listeners_raise_non_convergence() {
    let c = Counter::new(0);
    let even_log: Log = Rc::default();
    let odd_log: Log = Rc::default();
    writing_listener(&c, &even_log, |v| (v % 2 != 0).then_some(v + 1));
    let odd = writing_listener(&c, &odd_log, |v| (v % 2 == 0).then_some(v + 1));

    let counter = Rc::clone(&c);
    let err = catch_non_convergence(move || counter.set(1)).unwrap_err();
    assert!(matches!(
        err.reason(),
        NonConvergenceReason::ReentrancyLimit { .. }
            | NonConvergenceReason::Oscillation
            | NonConvergenceReason::Reverted
    ));
    assert_eq!(err.observable(), Some("counter"));

    // Storage is unlocked and usable again.
    assert_eq!(c.listeners.depth(), 0);
    assert!(matches!(c.listeners.shape(), DataShape::Many { locked: false, .. }));
    assert!(c.listeners.remove_change_listener(&odd));
    let settled = c.value();
    c.set(settled + 1);
    assert_eq!(c.value() % 2, 0);
}

#[test]
fn runaway_single_listener_hits_reentrancy_limit() {
    let c = Counter::new(0);
    let log: Log = Rc::default();
    writing_listener(&c, &log, |v| Some(v + 1));

    let counter = Rc::clone(&c);
    let err = catch_non_convergence(move || counter.set(1)).unwrap_err();
    assert!(matches!(err.reason(), NonConvergenceReason::ReentrancyLimit { .. }));
    assert_eq!(c.listeners.depth(), 0);
    assert_eq!(c.listeners.shape(), DataShape::Change);
}

#[test]
fn expired_weak_listener_is_skipped_and_pruned() {
    let c = Counter::new(0);
    let hits = Rc::new(Cell::new(0));
    let hits_clone = Rc::clone(&hits);
    let strong = InvalidationListener::new(move |_| hits_clone.set(hits_clone.get() + 1));
    c.listeners.add_invalidation_listener(strong.downgrade());
    c.listeners.add_invalidation_listener(InvalidationListener::new(|_| {}));

    c.set(1);
    assert_eq!(hits.get(), 1);
    drop(strong);
    c.set(2);
    assert_eq!(hits.get(), 1);

    c.listeners.add_invalidation_listener(InvalidationListener::new(|_| {}));
    assert_eq!(c.listeners.listener_count(), 2);
}

#[test]
fn subscription_dropped_inside_listener_is_reaped_at_next_notification() {
    reaper::drain();
    let c = Counter::new(0);
    let hits = Rc::new(Cell::new(0));
    let hits_clone = Rc::clone(&hits);
    let observed = InvalidationListener::new(move |_| hits_clone.set(hits_clone.get() + 1));
    c.listeners.add_invalidation_listener(observed.clone());

    let target = Rc::downgrade(&c);
    let handle = observed.clone();
    let subscription = Rc::new(RefCell::new(Some(Subscription::new(move || {
        if let Some(c) = target.upgrade() {
            c.listeners.remove_invalidation_listener(&handle);
        }
    }))));
    let slot = Rc::clone(&subscription);
    c.listeners.add_invalidation_listener(InvalidationListener::new(move |_| {
        drop(slot.borrow_mut().take());
    }));

    c.set(1);
    assert_eq!(hits.get(), 1);
    assert_eq!(reaper::pending(), 1);
    assert_eq!(c.listeners.listener_count(), 2);

    c.set(2);
    assert_eq!(reaper::pending(), 0);
    assert_eq!(hits.get(), 1);
    assert_eq!(c.listeners.shape(), DataShape::Invalidation);
}
