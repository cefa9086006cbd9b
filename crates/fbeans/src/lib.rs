#![forbid(unsafe_code)]

//! Observable properties, collections and bindings.
//!
//! # Role in fbeans
//! `fbeans` is the user-facing crate. It layers typed observables on the
//! notification core in [`fbeans_core`] and re-exports the parts of the core
//! a caller touches: listener handles, subscriptions, configuration and the
//! uncaught-error channel.
//!
//! # Primary responsibilities
//! - **Property**: a shared value with validation and one-way binding.
//! - **ObservableList / ObservableSet**: collections reporting each mutation
//!   as a change record, in application order.
//! - **Bindings**: bidirectional property bindings with rollback, and
//!   content bindings between collections.
//!
//! # Example
//! ```
//! use fbeans::{Property, bind_bidirectional};
//!
//! let width = Property::named("width", 80);
//! let columns = Property::new(0);
//! bind_bidirectional(&columns, &width).unwrap();
//! width.set(120);
//! assert_eq!(columns.get(), 120);
//! ```

pub mod binding;
pub mod collections;
pub mod error;
pub mod property;

pub use fbeans_core::{
    ChangeListener, InvalidationListener, ListenerError, NonConvergence, NonConvergenceReason,
    NotifyConfig, ObservableValue, StructuralListener, Subscription, UncaughtHandler,
    catch_non_convergence, set_uncaught_handler, take_uncaught_handler,
};

pub use binding::{
    ContentCollection, bind_bidirectional, bind_content, bind_content_bidirectional,
    is_bound_bidirectionally, is_content_bound, unbind_bidirectional, unbind_content,
    unbind_content_bidirectional,
};
pub use collections::{ListChange, ObservableList, ObservableSet, SetChange, WeakList, WeakSet};
pub use error::{BindingError, PropertyError};
pub use property::{Property, WeakProperty};
