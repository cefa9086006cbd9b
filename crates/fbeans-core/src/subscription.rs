#![forbid(unsafe_code)]

//! RAII handle that undoes a registration.

use std::fmt;

use crate::reaper;

/// Undoes a listener registration or binding.
///
/// Calling [`unsubscribe`](Self::unsubscribe) runs the cleanup immediately.
/// Dropping an active subscription queues the cleanup on this thread's
/// reaper instead, so a subscription may be dropped from inside a listener
/// without reentering the observable it belongs to.
#[must_use = "dropping a Subscription schedules its cleanup"]
pub struct Subscription {
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap a cleanup action.
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// A subscription that does nothing.
    pub fn empty() -> Self {
        Self { cleanup: None }
    }

    /// Run the cleanup now. Later calls do nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }

    /// True until the cleanup has run or been queued.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cleanup.is_some()
    }

    /// A subscription that unsubscribes both, `self` first.
    pub fn and(mut self, mut other: Subscription) -> Subscription {
        if !other.is_active() {
            return self;
        }
        if !self.is_active() {
            return other;
        }
        Subscription::new(move || {
            self.unsubscribe();
            other.unsubscribe();
        })
    }

    /// Combine any number of subscriptions, unsubscribed in order.
    pub fn combine(subscriptions: impl IntoIterator<Item = Subscription>) -> Subscription {
        subscriptions
            .into_iter()
            .fold(Subscription::empty(), Subscription::and)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            reaper::enqueue(cleanup);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
