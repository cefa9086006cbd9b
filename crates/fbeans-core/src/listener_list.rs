#![forbid(unsafe_code)]

//! The two-or-more listener container and its locking protocol.
//!
//! A [`ListenerList`] keeps one slot array per listener kind. Iteration
//! order is registration order within a kind, and kinds are visited
//! invalidation → change → structural.
//!
//! # Locking
//!
//! While a notification walks the list it is *locked*:
//!
//! ```text
//!            locked_size
//!                 │
//! [inv 0..i][chg 0..c][st 0..s] │ pending: [added while locked ...]
//!  ▲ tombstones (None) replace   │  invisible to the running loop,
//!    removed listeners in place  │  merged in by unlock()
//! ```
//!
//! 1. Slot arrays never shrink or move while locked; `remove` tombstones.
//! 2. `add` while locked goes to `pending`.
//! 3. `unlock` reports whether anything was deferred; only then does it
//!    compact (merge pending, squeeze tombstones, prune expired weak
//!    listeners).
//!
//! # Weak listeners
//!
//! Expired weak listeners are only pruned at mutation points (`add`,
//! `remove`, a modifying `unlock`), never during plain iteration, so counts
//! stay stable between mutations.

use std::fmt;

use smallvec::SmallVec;

use crate::capacity::Slots;
use crate::convergence::NotifyState;
use crate::listener::{ChangeListener, InvalidationListener, Listener, ListenerKind, StructuralListener};

/// Container for two or more listeners.
pub struct ListenerList<T: 'static, C: 'static = ()> {
    invalidation: Slots<InvalidationListener<T>>,
    change: Slots<ChangeListener<T>>,
    structural: Slots<StructuralListener<C>>,
    /// Listeners added while locked.
    pending: SmallVec<[Listener<T, C>; 2]>,
    locked: bool,
    locked_size: usize,
    nulled: usize,
    /// Value last delivered to change listeners.
    latest: Option<T>,
    state: NotifyState,
}

impl<T: 'static, C: 'static> Default for ListenerList<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, C: 'static> fmt::Debug for ListenerList<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("invalidation", &self.invalidation.live())
            .field("change", &self.change.live())
            .field("structural", &self.structural.live())
            .field("pending", &self.pending.len())
            .field("locked", &self.locked)
            .field("nulled", &self.nulled)
            .finish()
    }
}

impl<T: 'static, C: 'static> ListenerList<T, C> {
    /// Create an empty, unlocked list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            invalidation: Slots::new(),
            change: Slots::new(),
            structural: Slots::new(),
            pending: SmallVec::new(),
            locked: false,
            locked_size: 0,
            nulled: 0,
            latest: None,
            state: NotifyState::default(),
        }
    }

    /// Build a list from two listeners. `latest` seeds the old-value cache.
    #[must_use]
    pub fn with_pair(first: Listener<T, C>, second: Listener<T, C>, latest: Option<T>) -> Self {
        let mut list = Self::new();
        list.push_unlocked(first);
        list.push_unlocked(second);
        list.latest = latest;
        list
    }

    /// Register a listener. Hidden from a running notification if locked.
    pub fn add(&mut self, listener: Listener<T, C>) {
        if self.locked {
            self.pending.push(listener);
            return;
        }
        self.prune_kind(listener.kind());
        self.push_unlocked(listener);
    }

    /// Unregister the first registration of `target`.
    ///
    /// Returns the removed handle so the caller can drop it outside any
    /// borrow. Removing an absent listener returns `None`.
    pub fn remove(&mut self, target: &Listener<T, C>) -> Option<Listener<T, C>> {
        let locked = self.locked;
        let taken = match target {
            Listener::Invalidation(t) => {
                take_slot(&mut self.invalidation, locked, |l| l.same(t)).map(|(l, tomb)| (Listener::Invalidation(l), tomb))
            }
            Listener::Change(t) => {
                take_slot(&mut self.change, locked, |l| l.same(t)).map(|(l, tomb)| (Listener::Change(l), tomb))
            }
            Listener::Structural(t) => {
                take_slot(&mut self.structural, locked, |l| l.same(t)).map(|(l, tomb)| (Listener::Structural(l), tomb))
            }
        };

        match taken {
            Some((listener, true)) => {
                self.nulled += 1;
                Some(listener)
            }
            Some((listener, false)) => {
                self.prune_kind(listener.kind());
                self.forget_latest_if_unused();
                Some(listener)
            }
            None => {
                let index = self.pending.iter().position(|p| p.same(target))?;
                Some(self.pending.remove(index))
            }
        }
    }

    /// Enter notification mode.
    ///
    /// # Panics
    ///
    /// Panics if the list is already locked.
    pub fn lock(&mut self) {
        assert!(!self.locked, "listener list is already locked");
        self.locked = true;
        self.locked_size = self.slot_count();
        tracing::trace!(locked_size = self.locked_size, "listener list locked");
    }

    /// Leave notification mode. Returns true if the list had to compact.
    ///
    /// # Panics
    ///
    /// Panics if the list is not locked.
    pub fn unlock(&mut self) -> bool {
        assert!(self.locked, "listener list is not locked");
        self.locked = false;
        self.state = NotifyState::default();
        if self.nulled == 0 && self.pending.is_empty() {
            return false;
        }
        let squeezed = self.prune_expired();
        let merged = self.pending.len();
        for listener in std::mem::take(&mut self.pending) {
            self.push_unlocked(listener);
        }
        self.nulled = 0;
        self.forget_latest_if_unused();
        tracing::trace!(squeezed, merged, "listener list compacted on unlock");
        true
    }

    /// True while a notification is in progress.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Slot count when the list was locked.
    #[inline]
    #[must_use]
    pub fn locked_size(&self) -> usize {
        self.locked_size
    }

    /// Tombstones created since the list was locked.
    #[inline]
    #[must_use]
    pub fn nulled(&self) -> usize {
        self.nulled
    }

    /// Registered listeners, pending ones included, tombstones excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invalidation.live() + self.change.live() + self.structural.live() + self.pending.len()
    }

    /// True when no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of invalidation slots visible to a running loop.
    #[inline]
    #[must_use]
    pub fn invalidation_slots(&self) -> usize {
        self.invalidation.len()
    }

    /// Number of change slots visible to a running loop.
    #[inline]
    #[must_use]
    pub fn change_slots(&self) -> usize {
        self.change.len()
    }

    /// Number of structural slots visible to a running loop.
    #[inline]
    #[must_use]
    pub fn structural_slots(&self) -> usize {
        self.structural.len()
    }

    /// Invalidation listener at `index`, `None` for a tombstone.
    #[must_use]
    pub fn invalidation_at(&self, index: usize) -> Option<InvalidationListener<T>> {
        self.invalidation.get(index).cloned()
    }

    /// Change listener at `index`, `None` for a tombstone.
    #[must_use]
    pub fn change_at(&self, index: usize) -> Option<ChangeListener<T>> {
        self.change.get(index).cloned()
    }

    /// Structural listener at `index`, `None` for a tombstone.
    #[must_use]
    pub fn structural_at(&self, index: usize) -> Option<StructuralListener<C>> {
        self.structural.get(index).cloned()
    }

    /// True when at least one change listener is registered.
    #[must_use]
    pub fn has_change_listeners(&self) -> bool {
        self.change.live() > 0
            || self
                .pending
                .iter()
                .any(|p| p.kind() == ListenerKind::Change)
    }

    /// Value last delivered to change listeners.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.latest.as_ref()
    }

    /// Record the value about to be delivered to change listeners.
    pub fn set_latest(&mut self, value: T) {
        self.latest = Some(value);
    }

    /// Seed the cache before a change listener is added. An existing cache
    /// wins while other change listeners still depend on it.
    pub fn seed_latest(&mut self, current: T) {
        if self.latest.is_none() || !self.has_change_listeners() {
            self.latest = Some(current);
        }
    }

    /// Take the cached value, leaving the cache empty.
    pub fn take_latest(&mut self) -> Option<T> {
        self.latest.take()
    }

    /// Cross-level notification state.
    #[must_use]
    pub fn state(&self) -> NotifyState {
        self.state
    }

    /// Mutable cross-level notification state.
    pub fn state_mut(&mut self) -> &mut NotifyState {
        &mut self.state
    }

    /// The only registered listener, if the list is unlocked and holds
    /// exactly one.
    #[must_use]
    pub fn single(&self) -> Option<Listener<T, C>> {
        if self.locked || self.len() != 1 {
            return None;
        }
        self.invalidation
            .iter()
            .next()
            .cloned()
            .map(Listener::Invalidation)
            .or_else(|| self.change.iter().next().cloned().map(Listener::Change))
            .or_else(|| self.structural.iter().next().cloned().map(Listener::Structural))
    }

    /// Drop tombstones and expired weak listeners from every array.
    pub fn prune_expired(&mut self) -> usize {
        self.invalidation.retain(|l| !l.is_expired())
            + self.change.retain(|l| !l.is_expired())
            + self.structural.retain(|l| !l.is_expired())
    }

    fn slot_count(&self) -> usize {
        self.invalidation.len() + self.change.len() + self.structural.len()
    }

    fn push_unlocked(&mut self, listener: Listener<T, C>) {
        match listener {
            Listener::Invalidation(l) => self.invalidation.push(l),
            Listener::Change(l) => self.change.push(l),
            Listener::Structural(l) => self.structural.push(l),
        }
    }

    fn prune_kind(&mut self, kind: ListenerKind) {
        match kind {
            ListenerKind::Invalidation => self.invalidation.retain(|l| !l.is_expired()),
            ListenerKind::Change => self.change.retain(|l| !l.is_expired()),
            ListenerKind::Structural => self.structural.retain(|l| !l.is_expired()),
        };
    }

    fn forget_latest_if_unused(&mut self) {
        if !self.locked && !self.has_change_listeners() {
            self.latest = None;
        }
    }
}

fn take_slot<L>(
    slots: &mut Slots<L>,
    locked: bool,
    matches: impl FnMut(&L) -> bool,
) -> Option<(L, bool)> {
    let index = slots.position(matches)?;
    if locked {
        slots.tombstone(index).map(|l| (l, true))
    } else {
        slots.remove(index).map(|l| (l, false))
    }
}
