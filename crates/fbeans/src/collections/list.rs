#![forbid(unsafe_code)]

//! Observable list.
//!
//! Every mutation is expressed as one splice: `removed` elements starting
//! at `from` were replaced by `added`. Applying the records in delivery
//! order to a copy of the list's old content reproduces the new content.

use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use fbeans_core::{
    ChangeListener, InvalidationListener, ListenerManager, ObservableValue, StructuralListener,
    Subscription,
};

use super::ChangeQueue;
use crate::binding::content::{ContentCollection, ContentLink, LinkId};

/// One list mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListChange<E> {
    /// Index of the first affected element.
    pub from: usize,
    /// Elements that were at `from..from + removed.len()`.
    pub removed: Vec<E>,
    /// Elements now at `from..from + added.len()`.
    pub added: Vec<E>,
}

impl<E> ListChange<E> {
    /// End of the added range.
    #[must_use]
    pub fn to(&self) -> usize {
        self.from + self.added.len()
    }

    #[must_use]
    pub fn was_added(&self) -> bool {
        !self.added.is_empty()
    }

    #[must_use]
    pub fn was_removed(&self) -> bool {
        !self.removed.is_empty()
    }

    /// Both removed and added elements.
    #[must_use]
    pub fn was_replaced(&self) -> bool {
        self.was_added() && self.was_removed()
    }

    /// Apply this change to `items`, which must hold the pre-change content.
    ///
    /// Returns false, leaving `items` untouched, if the removed range does
    /// not fit.
    pub fn apply_to(&self, items: &mut Vec<E>) -> bool
    where
        E: Clone,
    {
        let end = self.from + self.removed.len();
        if end > items.len() {
            return false;
        }
        items.splice(self.from..end, self.added.iter().cloned());
        true
    }
}

pub(crate) struct ListInner<E: Clone + PartialEq + 'static> {
    name: Option<String>,
    items: RefCell<Vec<E>>,
    listeners: ListenerManager<Vec<E>, ListChange<E>>,
    queue: ChangeQueue<ListChange<E>>,
    content: RefCell<Vec<Rc<ContentLink<ObservableList<E>>>>>,
}

/// A shared `Vec` that reports every mutation.
pub struct ObservableList<E: Clone + PartialEq + 'static> {
    inner: Rc<ListInner<E>>,
}

impl<E: Clone + PartialEq + 'static> Clone for ObservableList<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for ObservableList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("name", &self.inner.name)
            .field("items", &*self.inner.items.borrow())
            .finish()
    }
}

/// Non-owning handle to an [`ObservableList`].
pub struct WeakList<E: Clone + PartialEq + 'static> {
    inner: Weak<ListInner<E>>,
}

impl<E: Clone + PartialEq + 'static> WeakList<E> {
    /// The list, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ObservableList<E>> {
        self.inner.upgrade().map(|inner| ObservableList { inner })
    }
}

impl<E: Clone + PartialEq + 'static> Default for ObservableList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + PartialEq + 'static> ObservableList<E> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, Vec::new())
    }

    /// Create an empty list with a diagnostic name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(Some(name.into()), Vec::new())
    }

    /// Create a list holding `items`.
    #[must_use]
    pub fn from_vec(items: Vec<E>) -> Self {
        Self::build(None, items)
    }

    fn build(name: Option<String>, items: Vec<E>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                name,
                items: RefCell::new(items),
                listeners: ListenerManager::new(),
                queue: ChangeQueue::new(),
                content: RefCell::new(Vec::new()),
            }),
        }
    }

    /// True when both handles share the same list.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakList<E> {
        WeakList {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Clone of the element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<E> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Clone of the whole content.
    #[must_use]
    pub fn to_vec(&self) -> Vec<E> {
        self.inner.items.borrow().clone()
    }

    /// Access the content without cloning. Do not mutate the list from `f`.
    pub fn with<R>(&self, f: impl FnOnce(&[E]) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    /// Append an element.
    pub fn push(&self, item: E) {
        let end = self.len();
        self.splice(end..end, [item]);
    }

    /// Insert an element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, item: E) {
        self.splice(index..index, [item]);
    }

    /// Remove and return the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&self, index: usize) -> E {
        let len = self.len();
        assert!(index < len, "removal index (is {index}) should be < len (is {len})");
        let mut removed = self.splice(index..index + 1, []);
        removed.swap_remove(0)
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&self, index: usize, item: E) -> E {
        let len = self.len();
        assert!(index < len, "index (is {index}) should be < len (is {len})");
        let mut removed = self.splice(index..index + 1, [item]);
        removed.swap_remove(0)
    }

    /// Remove every element.
    pub fn clear(&self) {
        let len = self.len();
        self.splice(0..len, []);
    }

    /// Replace the whole content.
    pub fn set_all(&self, items: impl IntoIterator<Item = E>) {
        let len = self.len();
        self.splice(0..len, items);
    }

    /// Replace `range` with `items`, returning the removed elements.
    ///
    /// Emits one change unless nothing was removed or added.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    pub fn splice(&self, range: Range<usize>, items: impl IntoIterator<Item = E>) -> Vec<E> {
        let added: Vec<E> = items.into_iter().collect();
        let from = range.start;
        let removed: Vec<E> = self
            .inner
            .items
            .borrow_mut()
            .splice(range, added.iter().cloned())
            .collect();
        if !removed.is_empty() || !added.is_empty() {
            self.emit(ListChange {
                from,
                removed: removed.clone(),
                added,
            });
        }
        removed
    }

    fn emit(&self, change: ListChange<E>) {
        self.inner
            .queue
            .dispatch(change, |change| self.inner.listeners.fire(self, Some(change)));
    }

    /// Register a structural listener.
    pub fn add_listener(&self, listener: StructuralListener<ListChange<E>>) {
        self.inner.listeners.add_structural_listener(listener);
    }

    /// Unregister a structural listener.
    pub fn remove_listener(&self, listener: &StructuralListener<ListChange<E>>) -> bool {
        self.inner.listeners.remove_structural_listener(listener)
    }

    /// Register an invalidation listener.
    pub fn add_invalidation_listener(&self, listener: InvalidationListener<Vec<E>>) {
        self.inner.listeners.add_invalidation_listener(listener);
    }

    /// Unregister an invalidation listener.
    pub fn remove_invalidation_listener(&self, listener: &InvalidationListener<Vec<E>>) -> bool {
        self.inner.listeners.remove_invalidation_listener(listener)
    }

    /// Register a change listener on the whole content.
    pub fn add_change_listener(&self, listener: ChangeListener<Vec<E>>) {
        self.inner.listeners.add_change_listener(self, listener);
    }

    /// Unregister a change listener.
    pub fn remove_change_listener(&self, listener: &ChangeListener<Vec<E>>) -> bool {
        self.inner.listeners.remove_change_listener(listener)
    }

    /// Call `f` with every change until the subscription ends.
    pub fn subscribe(&self, f: impl Fn(&ListChange<E>) + 'static) -> Subscription {
        let listener = StructuralListener::new(f);
        self.add_listener(listener.clone());
        let list = self.downgrade();
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.remove_listener(&listener);
            }
        })
    }

    /// Registered listeners of all kinds.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.listener_count()
    }
}

impl<E: Clone + PartialEq + 'static> ObservableValue<Vec<E>> for ObservableList<E> {
    fn value(&self) -> Vec<E> {
        self.to_vec()
    }

    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }
}

impl<E: Clone + PartialEq + 'static> ContentCollection for ObservableList<E> {
    type Change = ListChange<E>;
    type Weak = WeakList<E>;

    fn downgrade(&self) -> WeakList<E> {
        ObservableList::downgrade(self)
    }

    fn upgrade(weak: &WeakList<E>) -> Option<Self> {
        weak.upgrade()
    }

    fn same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }

    fn label(&self) -> Option<String> {
        self.inner.name.clone()
    }

    fn sync_from(&self, source: &Self, origin: Option<LinkId>) {
        let wanted = source.to_vec();
        let Some((range, items)) = self.with(|current| {
            let prefix = current
                .iter()
                .zip(&wanted)
                .take_while(|(have, want)| have == want)
                .count();
            let room = current.len().min(wanted.len()) - prefix;
            let suffix = current
                .iter()
                .rev()
                .zip(wanted.iter().rev())
                .take(room)
                .take_while(|(have, want)| have == want)
                .count();
            let end = current.len() - suffix;
            let items = &wanted[prefix..wanted.len() - suffix];
            (end > prefix || !items.is_empty()).then(|| (prefix..end, items.to_vec()))
        }) else {
            return;
        };
        self.inner.queue.replaying(origin, || self.splice(range, items));
    }

    fn delivering_origin(&self) -> Option<LinkId> {
        self.inner.queue.delivering()
    }

    fn watch(&self, listener: StructuralListener<ListChange<E>>) {
        self.add_listener(listener);
    }

    fn unwatch(&self, listener: &StructuralListener<ListChange<E>>) {
        self.remove_listener(listener);
    }

    fn content_links(&self) -> &RefCell<Vec<Rc<ContentLink<Self>>>> {
        &self.inner.content
    }
}
