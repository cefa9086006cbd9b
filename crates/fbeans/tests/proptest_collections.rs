//! Property-based tests for observable collections and content bindings.
//!
//! For any sequence of list or set mutations:
//!
//! 1. Replaying the delivered change records on a copy of the initial
//!    content reproduces the final content.
//! 2. A mirror-bound collection equals its source after every mutation.
//! 3. Bidirectionally bound collections stay equal whichever side mutates.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use fbeans::{
    ObservableList, ObservableSet, bind_content, bind_content_bidirectional, is_content_bound,
};
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ListOp {
    Push(u8),
    Insert(usize, u8),
    Remove(usize),
    Set(usize, u8),
    Splice(usize, usize, Vec<u8>),
    Clear,
}

fn list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        4 => any::<u8>().prop_map(ListOp::Push),
        2 => (any::<usize>(), any::<u8>()).prop_map(|(i, v)| ListOp::Insert(i, v)),
        2 => any::<usize>().prop_map(ListOp::Remove),
        2 => (any::<usize>(), any::<u8>()).prop_map(|(i, v)| ListOp::Set(i, v)),
        2 => (any::<usize>(), 0usize..4, proptest::collection::vec(any::<u8>(), 0..4))
            .prop_map(|(at, n, items)| ListOp::Splice(at, n, items)),
        1 => Just(ListOp::Clear),
    ]
}

/// Apply `op` with indices folded into range; out-of-range ops on an empty
/// list are skipped.
fn apply(list: &ObservableList<u8>, op: &ListOp) {
    let len = list.len();
    match op {
        ListOp::Push(v) => list.push(*v),
        ListOp::Insert(i, v) => list.insert(i % (len + 1), *v),
        ListOp::Remove(i) if len > 0 => {
            list.remove(i % len);
        }
        ListOp::Set(i, v) if len > 0 => {
            list.set(i % len, *v);
        }
        ListOp::Splice(at, n, items) => {
            let from = at % (len + 1);
            let to = (from + n).min(len);
            list.splice(from..to, items.iter().copied());
        }
        ListOp::Clear => list.clear(),
        ListOp::Remove(_) | ListOp::Set(..) => {}
    }
}

#[derive(Debug, Clone)]
enum SetOp {
    Insert(u8),
    Remove(u8),
    Reset(Vec<u8>),
}

fn set_op() -> impl Strategy<Value = SetOp> {
    prop_oneof![
        4 => (0u8..16).prop_map(SetOp::Insert),
        3 => (0u8..16).prop_map(SetOp::Remove),
        1 => proptest::collection::vec(0u8..16, 0..6).prop_map(SetOp::Reset),
    ]
}

fn apply_set(set: &ObservableSet<u8>, op: &SetOp) {
    match op {
        SetOp::Insert(v) => {
            set.insert(*v);
        }
        SetOp::Remove(v) => {
            set.remove(v);
        }
        SetOp::Reset(items) => set.set_all(items.iter().copied()),
    }
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn change_records_replay_to_final_content(
        initial in proptest::collection::vec(any::<u8>(), 0..8),
        ops in proptest::collection::vec(list_op(), 1..32),
    ) {
        let list = ObservableList::from_vec(initial.clone());
        let replica = Rc::new(RefCell::new(initial));
        let sink = Rc::clone(&replica);
        let _sub = list.subscribe(move |change| {
            assert!(change.apply_to(&mut sink.borrow_mut()));
        });

        for op in &ops {
            apply(&list, op);
        }
        prop_assert_eq!(replica.borrow().clone(), list.to_vec());
    }

    #[test]
    fn mirror_tracks_source(
        initial in proptest::collection::vec(any::<u8>(), 0..8),
        ops in proptest::collection::vec(list_op(), 1..32),
    ) {
        let source = ObservableList::from_vec(initial);
        let target = ObservableList::new();
        bind_content(&target, &source).unwrap();

        for op in &ops {
            apply(&source, op);
            prop_assert_eq!(target.to_vec(), source.to_vec());
        }
        prop_assert!(is_content_bound(&target, &source));
    }

    #[test]
    fn bidirectional_lists_stay_equal(
        ops in proptest::collection::vec((any::<bool>(), list_op()), 1..32),
    ) {
        let a = ObservableList::new();
        let b = ObservableList::from_vec(vec![1, 2, 3]);
        bind_content_bidirectional(&a, &b).unwrap();

        for (on_a, op) in &ops {
            apply(if *on_a { &a } else { &b }, op);
            prop_assert_eq!(a.to_vec(), b.to_vec());
        }
    }

    #[test]
    fn bidirectional_sets_stay_equal(
        ops in proptest::collection::vec((any::<bool>(), set_op()), 1..32),
    ) {
        let a = ObservableSet::new();
        let b = ObservableSet::new();
        bind_content_bidirectional(&a, &b).unwrap();

        let mut model = BTreeSet::new();
        for (on_a, op) in &ops {
            apply_set(if *on_a { &a } else { &b }, op);
            match op {
                SetOp::Insert(v) => {
                    model.insert(*v);
                }
                SetOp::Remove(v) => {
                    model.remove(v);
                }
                SetOp::Reset(items) => model = items.iter().copied().collect(),
            }
            prop_assert_eq!(a.to_set(), model.clone());
            prop_assert_eq!(b.to_set(), model.clone());
        }
    }
}
