#![forbid(unsafe_code)]

//! Per-observable listener storage that stays allocation-free for the
//! common zero and one listener cases.
//!
//! ```text
//!            add                add                 remove / unlock
//!   Empty ───────▶ single ───────────▶ Many(list) ─────────────────▶ single / Empty
//!                  (Invalidation |                  (collapse when unlocked
//!                   Change{last} |                   and one or zero remain)
//!                   Structural)
//! ```
//!
//! A single change listener carries the value it last received so the
//! next notification can report the old value without asking the
//! observable for history.

use crate::listener::{ChangeListener, InvalidationListener, Listener, StructuralListener};
use crate::listener_list::ListenerList;

/// Listener storage of one observable.
pub enum ListenerData<T: 'static, C: 'static = ()> {
    /// No listeners.
    Empty,
    /// Exactly one invalidation listener.
    Invalidation(InvalidationListener<T>),
    /// Exactly one change listener and the value it last saw.
    Change {
        listener: ChangeListener<T>,
        last_value: T,
    },
    /// Exactly one structural listener.
    Structural(StructuralListener<C>),
    /// Two or more listeners.
    Many(Box<ListenerList<T, C>>),
}

impl<T: 'static, C: 'static> Default for ListenerData<T, C> {
    fn default() -> Self {
        Self::Empty
    }
}

/// Storage variant, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShape {
    Empty,
    Invalidation,
    Change,
    Structural,
    Many { len: usize, locked: bool },
}

impl<T: 'static, C: 'static> ListenerData<T, C> {
    /// Register an invalidation listener.
    pub fn add_invalidation(&mut self, listener: InvalidationListener<T>) {
        if matches!(self, Self::Empty) {
            *self = Self::Invalidation(listener);
            return;
        }
        self.promote(listener.into(), None);
    }

    /// Register a change listener. `current` is the observable's value at
    /// registration and becomes the listener's first old value.
    pub fn add_change(&mut self, listener: ChangeListener<T>, current: T) {
        if matches!(self, Self::Empty) {
            *self = Self::Change {
                listener,
                last_value: current,
            };
            return;
        }
        self.promote(listener.into(), Some(current));
    }

    /// Register a structural listener.
    pub fn add_structural(&mut self, listener: StructuralListener<C>) {
        if matches!(self, Self::Empty) {
            *self = Self::Structural(listener);
            return;
        }
        self.promote(listener.into(), None);
    }

    /// Unregister the first registration of `target`, collapsing storage
    /// when possible. Returns the removed handle.
    pub fn remove(&mut self, target: &Listener<T, C>) -> Option<Listener<T, C>> {
        let matches_single = match (&*self, target) {
            (Self::Invalidation(l), Listener::Invalidation(t)) => l.same(t),
            (Self::Change { listener, .. }, Listener::Change(t)) => listener.same(t),
            (Self::Structural(l), Listener::Structural(t)) => l.same(t),
            _ => false,
        };
        if matches_single {
            return std::mem::take(self).into_single();
        }
        let Self::Many(list) = self else {
            return None;
        };
        let removed = list.remove(target)?;
        self.collapse();
        Some(removed)
    }

    /// Shrink a `Many` back to a single variant or `Empty` when it is
    /// unlocked and holds at most one listener.
    ///
    /// A lone change listener is only collapsed when the old-value cache is
    /// populated; otherwise the list form is kept.
    pub fn collapse(&mut self) {
        let Self::Many(list) = self else {
            return;
        };
        if list.is_locked() {
            return;
        }
        list.prune_expired();
        let next = match list.len() {
            0 => Self::Empty,
            1 => match list.single() {
                Some(Listener::Invalidation(l)) => Self::Invalidation(l),
                Some(Listener::Structural(l)) => Self::Structural(l),
                Some(Listener::Change(l)) => match list.take_latest() {
                    Some(last_value) => Self::Change {
                        listener: l,
                        last_value,
                    },
                    None => return,
                },
                None => return,
            },
            _ => return,
        };
        *self = next;
    }

    /// Registered listeners, tombstones excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Invalidation(_) | Self::Change { .. } | Self::Structural(_) => 1,
            Self::Many(list) => list.len(),
        }
    }

    /// True when no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which variant is active.
    #[must_use]
    pub fn shape(&self) -> DataShape {
        match self {
            Self::Empty => DataShape::Empty,
            Self::Invalidation(_) => DataShape::Invalidation,
            Self::Change { .. } => DataShape::Change,
            Self::Structural(_) => DataShape::Structural,
            Self::Many(list) => DataShape::Many {
                len: list.len(),
                locked: list.is_locked(),
            },
        }
    }

    /// The list, when storage is in list form.
    #[must_use]
    pub fn as_list(&self) -> Option<&ListenerList<T, C>> {
        match self {
            Self::Many(list) => Some(list),
            _ => None,
        }
    }

    /// The list, mutably, when storage is in list form.
    pub fn as_list_mut(&mut self) -> Option<&mut ListenerList<T, C>> {
        match self {
            Self::Many(list) => Some(list),
            _ => None,
        }
    }

    /// Move to list form with `listener` registered after the existing
    /// ones. `current` seeds the old-value cache when `listener` is a change
    /// listener.
    fn promote(&mut self, listener: Listener<T, C>, current: Option<T>) {
        let list = match std::mem::take(self) {
            Self::Invalidation(l) => Box::new(ListenerList::with_pair(l.into(), listener, current)),
            Self::Structural(l) => Box::new(ListenerList::with_pair(l.into(), listener, current)),
            // The cached value is what the existing listener compares against.
            Self::Change {
                listener: existing,
                last_value,
            } => Box::new(ListenerList::with_pair(
                existing.into(),
                listener,
                Some(last_value),
            )),
            Self::Many(mut list) => {
                if let Some(current) = current {
                    list.seed_latest(current);
                }
                list.add(listener);
                list
            }
            Self::Empty => {
                let mut list = Box::new(ListenerList::new());
                if let Some(current) = current {
                    list.seed_latest(current);
                }
                list.add(listener);
                list
            }
        };
        *self = Self::Many(list);
    }

    fn into_single(self) -> Option<Listener<T, C>> {
        match self {
            Self::Invalidation(l) => Some(l.into()),
            Self::Change { listener, .. } => Some(listener.into()),
            Self::Structural(l) => Some(l.into()),
            Self::Empty | Self::Many(_) => None,
        }
    }
}
