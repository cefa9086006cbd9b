#![forbid(unsafe_code)]

//! Listener handles and the observable-value contract.
//!
//! Three listener kinds exist:
//!
//! | Kind | Callback | Delivered when |
//! |------|----------|----------------|
//! | [`InvalidationListener`] | `Fn(&dyn ObservableValue<T>)` | every notification |
//! | [`ChangeListener`] | `Fn(&dyn ObservableValue<T>, &old, &new)` | old != new |
//! | [`StructuralListener`] | `Fn(&C)` | a collection mutation carried a change record |
//!
//! A handle is a cheap clone of a reference-counted callback. Identity, used
//! for removal, is the callback allocation: two handles are the same listener
//! when one was cloned (or downgraded) from the other.
//!
//! # Weak handles
//!
//! [`downgrade`](InvalidationListener::downgrade) produces a handle that does
//! not keep the callback alive. Once every strong handle is dropped the weak
//! one is *expired*: notifications skip it and the next compaction of its
//! listener list prunes it.

use std::fmt;
use std::rc::{Rc, Weak};

/// A value that can be read and observed.
///
/// `value()` may be lazy or expensive; the notification core only calls it
/// when a change listener needs a fresh value.
pub trait ObservableValue<T> {
    /// Current value.
    fn value(&self) -> T;

    /// Diagnostic name used in error reports.
    fn name(&self) -> Option<String> {
        None
    }
}

/// Callback signature of an invalidation listener.
pub type InvalidationFn<T> = dyn Fn(&dyn ObservableValue<T>);
/// Callback signature of a change listener.
pub type ChangeFn<T> = dyn Fn(&dyn ObservableValue<T>, &T, &T);
/// Callback signature of a structural (collection change) listener.
pub type StructuralFn<C> = dyn Fn(&C);

enum Callback<F: ?Sized> {
    Strong(Rc<F>),
    Weak(Weak<F>),
}

impl<F: ?Sized> Callback<F> {
    fn upgrade(&self) -> Option<Rc<F>> {
        match self {
            Self::Strong(rc) => Some(Rc::clone(rc)),
            Self::Weak(weak) => weak.upgrade(),
        }
    }

    fn downgrade(&self) -> Self {
        match self {
            Self::Strong(rc) => Self::Weak(Rc::downgrade(rc)),
            Self::Weak(weak) => Self::Weak(Weak::clone(weak)),
        }
    }

    fn is_weak(&self) -> bool {
        matches!(self, Self::Weak(_))
    }

    fn is_expired(&self) -> bool {
        match self {
            Self::Strong(_) => false,
            Self::Weak(weak) => weak.strong_count() == 0,
        }
    }

    fn addr(&self) -> *const () {
        match self {
            Self::Strong(rc) => Rc::as_ptr(rc) as *const (),
            Self::Weak(weak) => Weak::as_ptr(weak) as *const (),
        }
    }
}

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        match self {
            Self::Strong(rc) => Self::Strong(Rc::clone(rc)),
            Self::Weak(weak) => Self::Weak(Weak::clone(weak)),
        }
    }
}

/// Listener notified that a value may have changed.
pub struct InvalidationListener<T: 'static> {
    callback: Callback<InvalidationFn<T>>,
}

impl<T: 'static> InvalidationListener<T> {
    /// Wrap a callback.
    pub fn new(callback: impl Fn(&dyn ObservableValue<T>) + 'static) -> Self {
        let rc: Rc<InvalidationFn<T>> = Rc::new(callback);
        Self {
            callback: Callback::Strong(rc),
        }
    }

    /// A weak handle to the same listener.
    #[must_use]
    pub fn downgrade(&self) -> Self {
        Self {
            callback: self.callback.downgrade(),
        }
    }

    /// True for handles produced by [`downgrade`](Self::downgrade).
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.callback.is_weak()
    }

    /// True when this is a weak handle whose callback is gone.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.callback.is_expired()
    }

    /// True when both handles refer to the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::eq(self.callback.addr(), other.callback.addr())
    }

    /// Call the listener. Returns false if the handle has expired.
    pub fn invoke(&self, observable: &dyn ObservableValue<T>) -> bool {
        match self.callback.upgrade() {
            Some(callback) => {
                callback(observable);
                true
            }
            None => false,
        }
    }
}

impl<T: 'static> Clone for InvalidationListener<T> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
        }
    }
}

impl<T: 'static> PartialEq for InvalidationListener<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<T: 'static> fmt::Debug for InvalidationListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationListener")
            .field("addr", &self.callback.addr())
            .field("weak", &self.is_weak())
            .finish()
    }
}

/// Listener notified with the old and new value of a change.
pub struct ChangeListener<T: 'static> {
    callback: Callback<ChangeFn<T>>,
}

impl<T: 'static> ChangeListener<T> {
    /// Wrap a callback receiving `(observable, old, new)`.
    pub fn new(callback: impl Fn(&dyn ObservableValue<T>, &T, &T) + 'static) -> Self {
        let rc: Rc<ChangeFn<T>> = Rc::new(callback);
        Self {
            callback: Callback::Strong(rc),
        }
    }

    /// A weak handle to the same listener.
    #[must_use]
    pub fn downgrade(&self) -> Self {
        Self {
            callback: self.callback.downgrade(),
        }
    }

    /// True for handles produced by [`downgrade`](Self::downgrade).
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.callback.is_weak()
    }

    /// True when this is a weak handle whose callback is gone.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.callback.is_expired()
    }

    /// True when both handles refer to the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::eq(self.callback.addr(), other.callback.addr())
    }

    /// Call the listener. Returns false if the handle has expired.
    pub fn invoke(&self, observable: &dyn ObservableValue<T>, old: &T, new: &T) -> bool {
        match self.callback.upgrade() {
            Some(callback) => {
                callback(observable, old, new);
                true
            }
            None => false,
        }
    }
}

impl<T: 'static> Clone for ChangeListener<T> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
        }
    }
}

impl<T: 'static> PartialEq for ChangeListener<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<T: 'static> fmt::Debug for ChangeListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeListener")
            .field("addr", &self.callback.addr())
            .field("weak", &self.is_weak())
            .finish()
    }
}

/// Listener notified with a collection change record.
pub struct StructuralListener<C: 'static> {
    callback: Callback<StructuralFn<C>>,
}

impl<C: 'static> StructuralListener<C> {
    /// Wrap a callback receiving the change record.
    pub fn new(callback: impl Fn(&C) + 'static) -> Self {
        let rc: Rc<StructuralFn<C>> = Rc::new(callback);
        Self {
            callback: Callback::Strong(rc),
        }
    }

    /// A weak handle to the same listener.
    #[must_use]
    pub fn downgrade(&self) -> Self {
        Self {
            callback: self.callback.downgrade(),
        }
    }

    /// True for handles produced by [`downgrade`](Self::downgrade).
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.callback.is_weak()
    }

    /// True when this is a weak handle whose callback is gone.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.callback.is_expired()
    }

    /// True when both handles refer to the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::eq(self.callback.addr(), other.callback.addr())
    }

    /// Call the listener. Returns false if the handle has expired.
    pub fn invoke(&self, change: &C) -> bool {
        match self.callback.upgrade() {
            Some(callback) => {
                callback(change);
                true
            }
            None => false,
        }
    }
}

impl<C: 'static> Clone for StructuralListener<C> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
        }
    }
}

impl<C: 'static> PartialEq for StructuralListener<C> {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<C: 'static> fmt::Debug for StructuralListener<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralListener")
            .field("addr", &self.callback.addr())
            .field("weak", &self.is_weak())
            .finish()
    }
}

/// Which array of a listener list a listener belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Invalidation,
    Change,
    Structural,
}

/// Any listener, tagged by kind.
pub enum Listener<T: 'static, C: 'static = ()> {
    Invalidation(InvalidationListener<T>),
    Change(ChangeListener<T>),
    Structural(StructuralListener<C>),
}

impl<T: 'static, C: 'static> Listener<T, C> {
    /// Kind tag.
    #[must_use]
    pub fn kind(&self) -> ListenerKind {
        match self {
            Self::Invalidation(_) => ListenerKind::Invalidation,
            Self::Change(_) => ListenerKind::Change,
            Self::Structural(_) => ListenerKind::Structural,
        }
    }

    /// True when this is a weak handle whose callback is gone.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self {
            Self::Invalidation(l) => l.is_expired(),
            Self::Change(l) => l.is_expired(),
            Self::Structural(l) => l.is_expired(),
        }
    }

    /// Same kind and same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Invalidation(a), Self::Invalidation(b)) => a.same(b),
            (Self::Change(a), Self::Change(b)) => a.same(b),
            (Self::Structural(a), Self::Structural(b)) => a.same(b),
            _ => false,
        }
    }
}

impl<T: 'static, C: 'static> Clone for Listener<T, C> {
    fn clone(&self) -> Self {
        match self {
            Self::Invalidation(l) => Self::Invalidation(l.clone()),
            Self::Change(l) => Self::Change(l.clone()),
            Self::Structural(l) => Self::Structural(l.clone()),
        }
    }
}

impl<T: 'static, C: 'static> fmt::Debug for Listener<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalidation(l) => l.fmt(f),
            Self::Change(l) => l.fmt(f),
            Self::Structural(l) => l.fmt(f),
        }
    }
}

impl<T: 'static, C: 'static> From<InvalidationListener<T>> for Listener<T, C> {
    fn from(listener: InvalidationListener<T>) -> Self {
        Self::Invalidation(listener)
    }
}

impl<T: 'static, C: 'static> From<ChangeListener<T>> for Listener<T, C> {
    fn from(listener: ChangeListener<T>) -> Self {
        Self::Change(listener)
    }
}

impl<T: 'static, C: 'static> From<StructuralListener<C>> for Listener<T, C> {
    fn from(listener: StructuralListener<C>) -> Self {
        Self::Structural(listener)
    }
}
