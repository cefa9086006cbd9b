//! Property-based invariant tests for listener storage and notification.
//!
//! For any sequence of registrations, removals and notifications:
//!
//! 1. `listener_count` equals the number of live registrations.
//! 2. Storage shape follows the count: 0 → empty, 1 → single, 2+ → list.
//! 3. A notification calls every live listener exactly once, invalidation
//!    listeners first, each kind in registration order.
//! 4. Change listeners receive the previous and the current value.
//! 5. Storage is never left locked after a notification.
//! 6. Slot capacities never drop below their length and follow the bands.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fbeans_core::capacity::{Slots, band_for, optimal_capacity};
use fbeans_core::{
    ChangeListener, DataShape, InvalidationListener, ListenerManager, ObservableValue,
};
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    AddInvalidation,
    AddChange,
    Remove(usize),
    Fire,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::AddInvalidation),
        3 => Just(Op::AddChange),
        2 => (0usize..16).prop_map(Op::Remove),
        2 => Just(Op::Fire),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(op_strategy(), 1..48)
}

// ── Harness ───────────────────────────────────────────────────────────────

struct Source {
    value: Cell<i32>,
    listeners: ListenerManager<i32>,
}

impl ObservableValue<i32> for Source {
    fn value(&self) -> i32 {
        self.value.get()
    }
}

enum Registered {
    Invalidation(usize, InvalidationListener<i32>),
    Change(usize, ChangeListener<i32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Invalidated(usize),
    Changed(usize, i32, i32),
}

fn run(ops: &[Op]) -> Result<(), TestCaseError> {
    let source = Source {
        value: Cell::new(0),
        listeners: ListenerManager::new(),
    };
    let calls: Rc<RefCell<Vec<Call>>> = Rc::default();
    let mut registered: Vec<Registered> = Vec::new();
    let mut next_id = 0;

    for op in ops {
        match op {
            Op::AddInvalidation => {
                let id = next_id;
                next_id += 1;
                let log = Rc::clone(&calls);
                let l = InvalidationListener::new(move |_| log.borrow_mut().push(Call::Invalidated(id)));
                source.listeners.add_invalidation_listener(l.clone());
                registered.push(Registered::Invalidation(id, l));
            }
            Op::AddChange => {
                let id = next_id;
                next_id += 1;
                let log = Rc::clone(&calls);
                let l = ChangeListener::new(move |_, old: &i32, new: &i32| {
                    log.borrow_mut().push(Call::Changed(id, *old, *new));
                });
                source.listeners.add_change_listener(&source, l.clone());
                registered.push(Registered::Change(id, l));
            }
            Op::Remove(i) => {
                if registered.is_empty() {
                    continue;
                }
                let victim = registered.remove(i % registered.len());
                let removed = match &victim {
                    Registered::Invalidation(_, l) => source.listeners.remove_invalidation_listener(l),
                    Registered::Change(_, l) => source.listeners.remove_change_listener(l),
                };
                prop_assert!(removed);
            }
            Op::Fire => {
                let old = source.value.get();
                let new = old + 1;
                source.value.set(new);
                calls.borrow_mut().clear();
                source.listeners.fire_value_changed(&source);

                let mut expected: Vec<Call> = registered
                    .iter()
                    .filter_map(|r| match r {
                        Registered::Invalidation(id, _) => Some(Call::Invalidated(*id)),
                        Registered::Change(..) => None,
                    })
                    .collect();
                expected.extend(registered.iter().filter_map(|r| match r {
                    Registered::Change(id, _) => Some(Call::Changed(*id, old, new)),
                    Registered::Invalidation(..) => None,
                }));
                prop_assert_eq!(&*calls.borrow(), &expected);
            }
        }

        prop_assert_eq!(source.listeners.listener_count(), registered.len());
        match (registered.len(), source.listeners.shape()) {
            (0, DataShape::Empty) => {}
            (1, DataShape::Invalidation | DataShape::Change) => {}
            (n, DataShape::Many { len, locked }) if n >= 2 => {
                prop_assert_eq!(len, n);
                prop_assert!(!locked);
            }
            (n, shape) => prop_assert!(false, "{n} listeners stored as {shape:?}"),
        }
    }
    Ok(())
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn storage_and_delivery_track_registrations(ops in ops_strategy()) {
        run(&ops)?;
    }

    #[test]
    fn optimal_capacity_always_fits(len in 0usize..500, current in 0usize..500) {
        let cap = optimal_capacity(len, current);
        prop_assert!(cap >= len);
        if len > current {
            prop_assert_eq!(cap, band_for(len));
        }
    }

    #[test]
    fn slots_keep_order_through_tombstones(
        n in 1usize..40,
        kill in proptest::collection::vec(any::<bool>(), 40),
    ) {
        let mut slots = Slots::new();
        for i in 0..n {
            slots.push(i);
        }
        for (i, dead) in kill.iter().take(n).enumerate() {
            if *dead {
                slots.tombstone(i);
            }
        }
        prop_assert_eq!(slots.len(), n);
        slots.retain(|_| true);
        let survivors: Vec<usize> = slots.iter().copied().collect();
        let expected: Vec<usize> = (0..n).filter(|i| !kill[*i]).collect();
        prop_assert_eq!(survivors, expected);
        prop_assert!(slots.capacity() >= slots.len());
    }
}
