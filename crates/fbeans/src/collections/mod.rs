#![forbid(unsafe_code)]

//! Observable collections.
//!
//! Each mutation produces one change record per structural listener
//! delivery. Deliveries are serialized per collection: a mutation made by a
//! listener while a change is being delivered is queued, and reaches the
//! listeners only after the current change has reached all of them. Every
//! listener therefore sees the deltas in the order they were applied.

pub mod list;
pub mod set;

pub use list::{ListChange, ObservableList, WeakList};
pub use set::{ObservableSet, SetChange, WeakSet};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::binding::content::LinkId;

/// FIFO of change records awaiting delivery.
///
/// Each record carries the content link whose synchronization produced it,
/// if any. The stamp is visible through [`delivering`](Self::delivering)
/// while that record reaches the listeners.
pub(crate) struct ChangeQueue<Ch> {
    pending: RefCell<VecDeque<(Option<LinkId>, Ch)>>,
    dispatching: Cell<bool>,
    origin: Cell<Option<LinkId>>,
    delivering: Cell<Option<LinkId>>,
}

impl<Ch> ChangeQueue<Ch> {
    pub(crate) fn new() -> Self {
        Self {
            pending: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
            origin: Cell::new(None),
            delivering: Cell::new(None),
        }
    }

    /// Run `f` with every record dispatched from it stamped with `origin`.
    pub(crate) fn replaying<R>(&self, origin: Option<LinkId>, f: impl FnOnce() -> R) -> R {
        let _restore = Restore {
            cell: &self.origin,
            saved: self.origin.replace(origin),
        };
        f()
    }

    /// Stamp of the record currently being delivered.
    pub(crate) fn delivering(&self) -> Option<LinkId> {
        self.delivering.get()
    }

    /// Queue `change`; if no delivery is running, deliver the queue until it
    /// is empty.
    pub(crate) fn dispatch(&self, change: Ch, mut deliver: impl FnMut(&Ch)) {
        self.pending
            .borrow_mut()
            .push_back((self.origin.get(), change));
        if self.dispatching.replace(true) {
            return;
        }
        // Mutations made by listeners carry no stamp.
        let _running = Running {
            queue: self,
            origin: self.origin.take(),
        };
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some((origin, change)) = next else {
                break;
            };
            self.delivering.set(origin);
            deliver(&change);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.borrow().len()
    }
}

struct Restore<'a> {
    cell: &'a Cell<Option<LinkId>>,
    saved: Option<LinkId>,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        self.cell.set(self.saved);
    }
}

/// Ends a delivery run. After an unwind the undelivered records are
/// dropped: they describe a state the listeners never reached.
struct Running<'a, Ch> {
    queue: &'a ChangeQueue<Ch>,
    origin: Option<LinkId>,
}

impl<Ch> Drop for Running<'_, Ch> {
    fn drop(&mut self) {
        self.queue.dispatching.set(false);
        self.queue.delivering.set(None);
        self.queue.origin.set(self.origin);
        self.queue.pending.borrow_mut().clear();
    }
}
