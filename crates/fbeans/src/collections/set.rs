#![forbid(unsafe_code)]

//! Observable ordered set.
//!
//! Each inserted or removed element is one [`SetChange`]. Bulk operations
//! emit one record per element, removals first.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use fbeans_core::{
    ChangeListener, InvalidationListener, ListenerManager, ObservableValue, StructuralListener,
    Subscription,
};

use super::ChangeQueue;
use crate::binding::content::{ContentCollection, ContentLink, LinkId};

/// One set mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetChange<E> {
    Added(E),
    Removed(E),
}

impl<E> SetChange<E> {
    /// The element that was added or removed.
    #[must_use]
    pub fn element(&self) -> &E {
        match self {
            Self::Added(e) | Self::Removed(e) => e,
        }
    }

    #[must_use]
    pub fn was_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

pub(crate) struct SetInner<E: Ord + Clone + 'static> {
    name: Option<String>,
    items: RefCell<BTreeSet<E>>,
    listeners: ListenerManager<BTreeSet<E>, SetChange<E>>,
    queue: ChangeQueue<SetChange<E>>,
    content: RefCell<Vec<Rc<ContentLink<ObservableSet<E>>>>>,
}

/// A shared `BTreeSet` that reports every mutation.
pub struct ObservableSet<E: Ord + Clone + 'static> {
    inner: Rc<SetInner<E>>,
}

impl<E: Ord + Clone + 'static> Clone for ObservableSet<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Ord + Clone + fmt::Debug + 'static> fmt::Debug for ObservableSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSet")
            .field("name", &self.inner.name)
            .field("items", &*self.inner.items.borrow())
            .finish()
    }
}

/// Non-owning handle to an [`ObservableSet`].
pub struct WeakSet<E: Ord + Clone + 'static> {
    inner: Weak<SetInner<E>>,
}

impl<E: Ord + Clone + 'static> WeakSet<E> {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObservableSet<E>> {
        self.inner.upgrade().map(|inner| ObservableSet { inner })
    }
}

impl<E: Ord + Clone + 'static> Default for ObservableSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Ord + Clone + 'static> ObservableSet<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, BTreeSet::new())
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(Some(name.into()), BTreeSet::new())
    }

    fn build(name: Option<String>, items: BTreeSet<E>) -> Self {
        Self {
            inner: Rc::new(SetInner {
                name,
                items: RefCell::new(items),
                listeners: ListenerManager::new(),
                queue: ChangeQueue::new(),
                content: RefCell::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakSet<E> {
        WeakSet {
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

    #[must_use]
    pub fn contains(&self, item: &E) -> bool {
        self.inner.items.borrow().contains(item)
    }

    /// Clone of the whole content.
    #[must_use]
    pub fn to_set(&self) -> BTreeSet<E> {
        self.inner.items.borrow().clone()
    }

    /// Access the content without cloning. Do not mutate the set from `f`.
    pub fn with<R>(&self, f: impl FnOnce(&BTreeSet<E>) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    /// Insert `item`. Returns false, emitting nothing, if it was present.
    pub fn insert(&self, item: E) -> bool {
        let inserted = self.inner.items.borrow_mut().insert(item.clone());
        if inserted {
            self.emit(SetChange::Added(item));
        }
        inserted
    }

    /// Remove `item`. Returns false, emitting nothing, if it was absent.
    pub fn remove(&self, item: &E) -> bool {
        let removed = self.inner.items.borrow_mut().take(item);
        match removed {
            Some(item) => {
                self.emit(SetChange::Removed(item));
                true
            }
            None => false,
        }
    }

    /// Remove every element.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.items.borrow_mut());
        for item in removed {
            self.emit(SetChange::Removed(item));
        }
    }

    /// Replace the content with `items`: elements not in `items` are
    /// removed, then missing ones added.
    pub fn set_all(&self, items: impl IntoIterator<Item = E>) {
        let wanted: BTreeSet<E> = items.into_iter().collect();
        let stale: Vec<E> = self.with(|current| current.difference(&wanted).cloned().collect());
        for item in &stale {
            self.remove(item);
        }
        for item in wanted {
            self.insert(item);
        }
    }

    fn emit(&self, change: SetChange<E>) {
        self.inner
            .queue
            .dispatch(change, |change| self.inner.listeners.fire(self, Some(change)));
    }

    /// Register a structural listener.
    pub fn add_listener(&self, listener: StructuralListener<SetChange<E>>) {
        self.inner.listeners.add_structural_listener(listener);
    }

    pub fn remove_listener(&self, listener: &StructuralListener<SetChange<E>>) -> bool {
        self.inner.listeners.remove_structural_listener(listener)
    }

    pub fn add_invalidation_listener(&self, listener: InvalidationListener<BTreeSet<E>>) {
        self.inner.listeners.add_invalidation_listener(listener);
    }

    pub fn remove_invalidation_listener(
        &self,
        listener: &InvalidationListener<BTreeSet<E>>,
    ) -> bool {
        self.inner.listeners.remove_invalidation_listener(listener)
    }

    pub fn add_change_listener(&self, listener: ChangeListener<BTreeSet<E>>) {
        self.inner.listeners.add_change_listener(self, listener);
    }

    pub fn remove_change_listener(&self, listener: &ChangeListener<BTreeSet<E>>) -> bool {
        self.inner.listeners.remove_change_listener(listener)
    }

    /// Call `f` with every change until the subscription ends.
    pub fn subscribe(&self, f: impl Fn(&SetChange<E>) + 'static) -> Subscription {
        let listener = StructuralListener::new(f);
        self.add_listener(listener.clone());
        let set = self.downgrade();
        Subscription::new(move || {
            if let Some(set) = set.upgrade() {
                set.remove_listener(&listener);
            }
        })
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.listener_count()
    }
}

impl<E: Ord + Clone + 'static> ObservableValue<BTreeSet<E>> for ObservableSet<E> {
    fn value(&self) -> BTreeSet<E> {
        self.to_set()
    }

    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }
}

impl<E: Ord + Clone + 'static> ContentCollection for ObservableSet<E> {
    type Change = SetChange<E>;
    type Weak = WeakSet<E>;

    fn downgrade(&self) -> WeakSet<E> {
        ObservableSet::downgrade(self)
    }

    fn upgrade(weak: &WeakSet<E>) -> Option<Self> {
        weak.upgrade()
    }

    fn same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }

    fn label(&self) -> Option<String> {
        self.inner.name.clone()
    }

    fn sync_from(&self, source: &Self, origin: Option<LinkId>) {
        let wanted = source.to_set();
        self.inner.queue.replaying(origin, || self.set_all(wanted));
    }

    fn delivering_origin(&self) -> Option<LinkId> {
        self.inner.queue.delivering()
    }

    fn watch(&self, listener: StructuralListener<SetChange<E>>) {
        self.add_listener(listener);
    }

    fn unwatch(&self, listener: &StructuralListener<SetChange<E>>) {
        self.remove_listener(listener);
    }

    fn content_links(&self) -> &RefCell<Vec<Rc<ContentLink<Self>>>> {
        &self.inner.content
    }
}
