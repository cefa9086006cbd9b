#![forbid(unsafe_code)]

//! Capacity policy and slot storage for listener arrays.
//!
//! Listener arrays are tiny in the common case and occasionally large. Rather
//! than letting `Vec` double, capacities move through a fixed band sequence:
//!
//! ```text
//! 3, 7, 13, 22, 36, 57, 88, 135, ...      next = prev + prev / 2 + 3
//! ```
//!
//! # Hysteresis
//!
//! Growth jumps to the first band that fits. Shrinking only happens when the
//! best-fitting band sits at least two bands below the current capacity, so
//! adding and removing a single listener at a band boundary never
//! reallocates back and forth.
//!
//! # Slots
//!
//! [`Slots`] stores `Option<L>`. `None` is a tombstone: a listener removed
//! while its list was locked. Tombstones keep indices of the surviving
//! listeners stable until the owning list compacts.

/// Smallest non-zero capacity handed out for a slot array.
pub const MIN_CAPACITY: usize = 3;

/// The band that follows `capacity`.
#[inline]
#[must_use]
pub const fn next_band(capacity: usize) -> usize {
    capacity + capacity / 2 + 3
}

/// Smallest band that can hold `len` elements (zero for an empty array).
#[must_use]
pub fn band_for(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let mut band = MIN_CAPACITY;
    while band < len {
        band = next_band(band);
    }
    band
}

/// Capacity an array of `len` elements should have, given its `current`
/// capacity.
#[must_use]
pub fn optimal_capacity(len: usize, current: usize) -> usize {
    if len > current {
        return band_for(len);
    }
    if len == 0 {
        return 0;
    }
    let fit = band_for(len);
    if next_band(next_band(fit)) <= current {
        fit
    } else {
        current
    }
}

/// Growable listener array with tombstone support.
#[derive(Debug, Clone)]
pub struct Slots<L> {
    items: Vec<Option<L>>,
}

impl<L> Default for Slots<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> Slots<L> {
    /// Create an empty array (no allocation).
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Number of slots, tombstones included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there are no slots at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn live(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    /// Allocated capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Listener at `index`, or `None` for a tombstone or an index past the end.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&L> {
        self.items.get(index).and_then(Option::as_ref)
    }

    /// Iterate occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &L> {
        self.items.iter().filter_map(Option::as_ref)
    }

    /// Append a listener, growing along the band sequence.
    pub fn push(&mut self, listener: L) {
        let wanted = optimal_capacity(self.items.len() + 1, self.items.capacity());
        if wanted > self.items.capacity() {
            self.items.reserve_exact(wanted - self.items.len());
        }
        self.items.push(Some(listener));
    }

    /// Index of the first occupied slot matching `pred`.
    pub fn position(&self, mut pred: impl FnMut(&L) -> bool) -> Option<usize> {
        self.items
            .iter()
            .position(|slot| slot.as_ref().is_some_and(&mut pred))
    }

    /// Replace the slot at `index` with a tombstone. Indices do not move.
    pub fn tombstone(&mut self, index: usize) -> Option<L> {
        self.items.get_mut(index).and_then(Option::take)
    }

    /// Remove the slot at `index`, shifting later slots down.
    pub fn remove(&mut self, index: usize) -> Option<L> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.shrink();
        removed
    }

    /// Drop tombstones and every listener rejected by `keep`, preserving the
    /// order of the survivors. Returns how many slots were squeezed out.
    pub fn retain(&mut self, mut keep: impl FnMut(&L) -> bool) -> usize {
        let before = self.items.len();
        self.items
            .retain(|slot| slot.as_ref().is_some_and(&mut keep));
        let squeezed = before - self.items.len();
        if squeezed > 0 {
            self.shrink();
        }
        squeezed
    }

    fn shrink(&mut self) {
        let wanted = optimal_capacity(self.items.len(), self.items.capacity());
        if wanted < self.items.capacity() {
            self.items.shrink_to(wanted);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
