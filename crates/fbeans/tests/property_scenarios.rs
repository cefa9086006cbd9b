//! End-to-end property behavior: change delivery, ordering, one-way and
//! bidirectional bindings.

use std::cell::RefCell;
use std::rc::Rc;

use fbeans::{
    BindingError, ChangeListener, InvalidationListener, Property, PropertyError,
    bind_bidirectional, is_bound_bidirectionally, unbind_bidirectional,
};
use pretty_assertions::assert_eq;

fn change_log(property: &Property<i32>) -> Rc<RefCell<Vec<(i32, i32)>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    property.add_change_listener(ChangeListener::new(move |_, old, new| {
        sink.borrow_mut().push((*old, *new));
    }));
    log
}

#[test]
fn equal_set_is_silent() {
    let p = Property::new(0);
    let log = change_log(&p);

    p.set(5);
    assert_eq!(*log.borrow(), vec![(0, 5)]);

    p.set(5);
    assert_eq!(*log.borrow(), vec![(0, 5)]);
    assert_eq!(p.version(), 1);
}

#[test]
fn change_listeners_run_in_registration_order() {
    let p = Property::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));
    for tag in ["L1", "L2"] {
        let sink = Rc::clone(&order);
        p.add_change_listener(ChangeListener::new(move |_, old: &i32, new: &i32| {
            sink.borrow_mut().push((tag, *old, *new));
        }));
    }

    p.set(1);
    assert_eq!(*order.borrow(), vec![("L1", 0, 1), ("L2", 0, 1)]);
}

#[test]
fn invalidation_listeners_precede_change_listeners() {
    let p = Property::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&order);
    p.add_change_listener(ChangeListener::new(move |_, _, _| {
        sink.borrow_mut().push("change");
    }));
    let sink = Rc::clone(&order);
    p.add_invalidation_listener(InvalidationListener::new(move |_| {
        sink.borrow_mut().push("invalidation");
    }));

    p.set(3);
    assert_eq!(*order.borrow(), vec!["invalidation", "change"]);
}

#[test]
fn bidirectional_scenario() {
    let a = Property::named("a", 1);
    let b = Property::named("b", 2);
    bind_bidirectional(&a, &b).unwrap();
    assert_eq!((a.get(), b.get()), (2, 2));

    a.set(10);
    assert_eq!(b.get(), 10);

    assert!(unbind_bidirectional(&a, &b));
    assert!(!is_bound_bidirectionally(&a, &b));
    b.set(11);
    assert_eq!(a.get(), 10);
}

#[test]
fn bidirectional_rejected_before_any_change() {
    let a = Property::new(1);
    let b = Property::new(2);
    a.set_validator(|v: &i32| if *v % 2 == 0 { Err("even".into()) } else { Ok(()) });

    let err = bind_bidirectional(&a, &b).unwrap_err();
    assert_eq!(
        err,
        BindingError::PropagationFailed {
            cause: PropertyError::Rejected {
                reason: "even".into()
            }
        }
    );
    assert_eq!(a.get(), 1);
    assert_eq!(a.listener_count(), 0);
    assert_eq!(b.listener_count(), 0);
}

#[test]
fn bound_property_follows_and_refuses_writes() {
    let source = Property::named("source", 1);
    let target = Property::named("target", 0);
    let log = change_log(&target);
    target.bind(&source).unwrap();

    source.set(4);
    assert_eq!(target.get(), 4);
    assert_eq!(
        target.try_set(9),
        Err(PropertyError::Bound {
            name: Some("target".into())
        })
    );
    assert_eq!(*log.borrow(), vec![(0, 1), (1, 4)]);

    target.unbind();
    target.set(9);
    source.set(5);
    assert_eq!(target.get(), 9);
}

#[test]
fn dropped_subscription_stops_delivery() {
    let p = Property::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let sub = p.subscribe_values(move |v| sink.borrow_mut().push(*v));

    p.set(1);
    drop(sub);
    p.set(2);
    assert_eq!(*seen.borrow(), vec![1]);
    assert_eq!(p.listener_count(), 0);
}
