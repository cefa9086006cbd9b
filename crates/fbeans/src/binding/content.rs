#![forbid(unsafe_code)]

//! Content bindings between observable collections.
//!
//! A [`ContentLink`] watches both collections. When one side reports a
//! change, the link brings the other side's content to the same state.
//! Collection deliveries can be deferred (see
//! [`collections`](crate::collections)), so a synchronous `updating` flag
//! cannot recognize the echo of a synchronization. Instead every record a
//! link's synchronization produces is stamped with the link's [`LinkId`],
//! and the link ignores deliveries that carry its own stamp. Since the link
//! copies state rather than replaying deltas, a delivery that arrives after
//! either side moved on still leaves both sides equal.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Mirror target modified directly | Link removed, [`BindingError::IllegalContentModification`] reported |
//! | One side dropped | Link removes itself from the survivor |

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use fbeans_core::StructuralListener;
use fbeans_core::uncaught::{self, ListenerError};

use crate::error::BindingError;

/// Identity of a content link, stamped on the change records its
/// synchronization emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(usize);

impl LinkId {
    pub(crate) fn of<T>(target: &T) -> Self {
        Self(target as *const T as usize)
    }
}

/// A collection that can take part in a content binding.
///
/// Implemented by [`ObservableList`](crate::ObservableList) and
/// [`ObservableSet`](crate::ObservableSet).
pub trait ContentCollection: Sized + 'static {
    /// Change record delivered to structural listeners.
    type Change: 'static;
    /// Non-owning handle.
    type Weak: 'static;

    fn downgrade(&self) -> Self::Weak;
    fn upgrade(weak: &Self::Weak) -> Option<Self>;
    /// True when both handles share one collection.
    fn same(&self, other: &Self) -> bool;
    /// Diagnostic name.
    fn label(&self) -> Option<String>;
    /// Make the content equal to `source`'s, stamping the emitted records
    /// with `origin`. Emits nothing when the contents already match.
    fn sync_from(&self, source: &Self, origin: Option<LinkId>);
    /// Stamp of the record currently being delivered, if any.
    fn delivering_origin(&self) -> Option<LinkId>;
    fn watch(&self, listener: StructuralListener<Self::Change>);
    fn unwatch(&self, listener: &StructuralListener<Self::Change>);
    /// Content links this collection takes part in.
    fn content_links(&self) -> &RefCell<Vec<Rc<ContentLink<Self>>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    First,
    Second,
}

/// Content binding between two collections, owned by both.
///
/// `first` is the mirror target (or side `a`), `second` the source (or side
/// `b`).
pub struct ContentLink<L: ContentCollection> {
    bidirectional: bool,
    first: L::Weak,
    second: L::Weak,
    first_listener: StructuralListener<L::Change>,
    second_listener: StructuralListener<L::Change>,
}

impl<L: ContentCollection> ContentLink<L> {
    fn id(&self) -> LinkId {
        LinkId::of(self)
    }

    fn connects(&self, first: &L, second: &L) -> bool {
        let points_to =
            |weak: &L::Weak, target: &L| L::upgrade(weak).is_some_and(|l| l.same(target));
        points_to(&self.first, first) && points_to(&self.second, second)
    }

    fn on_change(&self, side: Side) {
        let (this, other) = match side {
            Side::First => (&self.first, &self.second),
            Side::Second => (&self.second, &self.first),
        };
        let Some(this) = L::upgrade(this) else {
            self.detach();
            return;
        };
        if this.delivering_origin() == Some(self.id()) {
            return;
        }

        if side == Side::First && !self.bidirectional {
            let target = this.label();
            self.detach();
            report(BindingError::IllegalContentModification { target });
            return;
        }

        let Some(other) = L::upgrade(other) else {
            self.detach();
            return;
        };
        other.sync_from(&this, Some(self.id()));
    }

    /// Unregister from both collections.
    fn detach(&self) {
        for (side, listener) in [
            (&self.first, &self.first_listener),
            (&self.second, &self.second_listener),
        ] {
            if let Some(collection) = L::upgrade(side) {
                collection.unwatch(listener);
                collection
                    .content_links()
                    .borrow_mut()
                    .retain(|link| !std::ptr::eq(Rc::as_ptr(link), self));
            }
        }
        tracing::debug!(bidirectional = self.bidirectional, "content binding removed");
    }
}

fn report(error: BindingError) {
    tracing::warn!(error = %error, "content binding failed");
    uncaught::report(ListenerError::Failed(Box::new(error)));
}

fn find_link<L: ContentCollection>(a: &L, b: &L) -> Option<Rc<ContentLink<L>>> {
    a.content_links()
        .borrow()
        .iter()
        .find(|link| link.connects(a, b) || link.connects(b, a))
        .cloned()
}

fn link<L: ContentCollection>(
    first: &L,
    second: &L,
    bidirectional: bool,
) -> Result<(), BindingError> {
    if first.same(second) {
        return Err(BindingError::SelfBinding);
    }
    if find_link(first, second).is_some() {
        return Err(BindingError::AlreadyBound);
    }
    let link = Rc::new_cyclic(|weak: &Weak<ContentLink<L>>| {
        let from_first = Weak::clone(weak);
        let from_second = Weak::clone(weak);
        ContentLink {
            bidirectional,
            first: first.downgrade(),
            second: second.downgrade(),
            first_listener: StructuralListener::new(move |_: &L::Change| {
                if let Some(link) = from_first.upgrade() {
                    link.on_change(Side::First);
                }
            }),
            second_listener: StructuralListener::new(move |_: &L::Change| {
                if let Some(link) = from_second.upgrade() {
                    link.on_change(Side::Second);
                }
            }),
        }
    });
    // Stamped, so a delivery still queued on `first` is not mistaken for a
    // direct edit once the link watches it.
    first.sync_from(second, Some(link.id()));
    first.watch(link.first_listener.clone());
    second.watch(link.second_listener.clone());
    first.content_links().borrow_mut().push(Rc::clone(&link));
    second.content_links().borrow_mut().push(link);
    tracing::debug!(
        first = ?first.label(),
        second = ?second.label(),
        bidirectional,
        "content binding established"
    );
    Ok(())
}

fn unlink<L: ContentCollection>(a: &L, b: &L, bidirectional: bool) -> bool {
    match find_link(a, b) {
        Some(link) if link.bidirectional == bidirectional => {
            link.detach();
            true
        }
        _ => false,
    }
}

/// Make `target` mirror `source`.
///
/// `target` takes `source`'s content immediately and follows every later
/// change of `source`. Modifying `target` directly removes the binding.
pub fn bind_content<L: ContentCollection>(target: &L, source: &L) -> Result<(), BindingError> {
    link(target, source, false)
}

/// Keep the contents of `a` and `b` equal. `a` adopts `b`'s content.
pub fn bind_content_bidirectional<L: ContentCollection>(a: &L, b: &L) -> Result<(), BindingError> {
    link(a, b, true)
}

/// Remove the mirror binding between `target` and `source`. Returns false
/// if there was none.
pub fn unbind_content<L: ContentCollection>(target: &L, source: &L) -> bool {
    unlink(target, source, false)
}

/// Remove the bidirectional content binding between `a` and `b`, in either
/// order. Returns false if there was none.
pub fn unbind_content_bidirectional<L: ContentCollection>(a: &L, b: &L) -> bool {
    unlink(a, b, true)
}

/// True when `a` and `b` share a content binding of either kind.
#[must_use]
pub fn is_content_bound<L: ContentCollection>(a: &L, b: &L) -> bool {
    find_link(a, b).is_some()
}
