#![forbid(unsafe_code)]

//! Core: listener storage and the notification engine behind observable
//! values.
//!
//! # Role in fbeans
//! `fbeans-core` knows nothing about properties or collections. It owns the
//! pieces every observable needs: listener handles, compact per-observable
//! storage, the reentrancy-safe notification driver, and deferred cleanup of
//! dropped subscriptions. `fbeans` builds properties, observable collections
//! and bindings on top.
//!
//! # Primary responsibilities
//! - **ListenerManager**: registration plus notification for one observable.
//! - **ListenerData / ListenerList**: zero/one/many storage with a locking
//!   protocol that tolerates listeners mutating their own registrations.
//! - **Convergence**: stops listeners that keep rewriting the value.
//! - **Subscription / reaper**: RAII unregistration, deferred to a safe point.
//! - **Uncaught handler**: where listener panics go instead of unwinding.
//!
//! # Threading
//! Everything here is single-threaded (`Rc`, `RefCell`); observables are
//! `!Send`. Per-thread state (reaper queue, uncaught handler) lives in
//! thread-locals.

pub mod capacity;
pub mod config;
pub mod convergence;
pub mod listener;
pub mod listener_data;
pub mod listener_list;
pub mod logging;
pub mod manager;
pub mod reaper;
pub mod subscription;
pub mod uncaught;

// Re-export tracing macros at crate root for ergonomic use.
pub use logging::{debug, error, info, trace, warn};

pub use config::NotifyConfig;
pub use convergence::{
    NonConvergence, NonConvergenceReason, NotifyState, Outcome, catch_non_convergence,
};
pub use listener::{
    ChangeListener, InvalidationListener, Listener, ListenerKind, ObservableValue,
    StructuralListener,
};
pub use listener_data::{DataShape, ListenerData};
pub use listener_list::ListenerList;
pub use manager::ListenerManager;
pub use reaper::ReaperStats;
pub use subscription::Subscription;
pub use uncaught::{ListenerError, UncaughtHandler, set_uncaught_handler, take_uncaught_handler};
