#![forbid(unsafe_code)]

//! Observable property: a shared value with invalidation and change
//! listeners, validation, and bindings.
//!
//! # Design
//!
//! [`Property<T>`] is a reference-counted handle. Cloning it shares the
//! value, the listeners and the bindings. Notification goes through
//! [`ListenerManager`], so listeners may read, write, add and remove
//! listeners on the property they are being notified about.
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `get()` | O(1) + clone |
//! | `set()` | O(L) where L = listeners |
//! | add listener | O(1) amortized |
//! | remove listener | O(L) |
//!
//! # Failure Modes
//!
//! - **Bound property**: `try_set` returns [`PropertyError::Bound`]; `set`
//!   panics.
//! - **Validator rejects**: `try_set` returns [`PropertyError::Rejected`].
//! - **Set inside `with`**: the value is borrowed for the duration of the
//!   closure; writing the same property from inside it panics.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use fbeans_core::uncaught::{self, ListenerError};
use fbeans_core::{
    ChangeListener, DataShape, InvalidationListener, ListenerManager, ObservableValue,
    Subscription,
};

use crate::binding::bidirectional::BidirectionalLink;
use crate::error::PropertyError;

type Validator<T> = Rc<dyn Fn(&T) -> Result<(), String>>;

/// Shared interior for [`Property<T>`].
pub(crate) struct PropertyInner<T: 'static> {
    name: Option<String>,
    value: RefCell<T>,
    version: Cell<u64>,
    validator: RefCell<Option<Validator<T>>>,
    /// Unidirectional binding to another property.
    binding: RefCell<Option<Subscription>>,
    /// Bidirectional bindings this property takes part in.
    links: RefCell<Vec<Rc<BidirectionalLink<T>>>>,
    listeners: ListenerManager<T>,
}

/// A shared, observable, optionally validated value.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing write.
/// 2. Writing a value equal to the current one is a no-op.
/// 3. Listeners are notified in registration order, invalidation listeners
///    before change listeners.
/// 4. A unidirectionally bound property only changes through its binding.
pub struct Property<T: 'static> {
    inner: Rc<PropertyInner<T>>,
}

impl<T: 'static> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .field("listeners", &self.inner.listeners.listener_count())
            .finish()
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Non-owning handle to a [`Property`].
pub struct WeakProperty<T: 'static> {
    inner: Weak<PropertyInner<T>>,
}

impl<T: 'static> Clone for WeakProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: 'static> WeakProperty<T> {
    /// The property, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Property<T>> {
        self.inner.upgrade().map(|inner| Property { inner })
    }

    /// True when this handle refers to `property`.
    #[must_use]
    pub fn points_to(&self, property: &Property<T>) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Rc::as_ptr(&property.inner))
    }
}

impl<T: 'static> Property<T> {
    /// True when both handles share the same property.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakProperty<T> {
        WeakProperty {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Current version number.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Access the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Registered listeners, bindings included.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.listener_count()
    }

    /// Storage variant of the listener manager.
    #[must_use]
    pub fn listener_shape(&self) -> DataShape {
        self.inner.listeners.shape()
    }

    /// True while a unidirectional binding drives this property.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.binding.borrow().is_some()
    }

    /// Install a validator. Values it rejects never reach the property.
    pub fn set_validator(&self, validator: impl Fn(&T) -> Result<(), String> + 'static) {
        *self.inner.validator.borrow_mut() = Some(Rc::new(validator));
    }

    /// Remove the validator.
    pub fn clear_validator(&self) {
        self.inner.validator.borrow_mut().take();
    }

    /// Register an invalidation listener.
    pub fn add_invalidation_listener(&self, listener: InvalidationListener<T>) {
        self.inner.listeners.add_invalidation_listener(listener);
    }

    /// Unregister an invalidation listener.
    pub fn remove_invalidation_listener(&self, listener: &InvalidationListener<T>) -> bool {
        self.inner.listeners.remove_invalidation_listener(listener)
    }

    /// Unregister a change listener.
    pub fn remove_change_listener(&self, listener: &ChangeListener<T>) -> bool {
        self.inner.listeners.remove_change_listener(listener)
    }

    /// Drop the unidirectional binding, if any. The value stays as it is.
    pub fn unbind(&self) {
        let binding = self.inner.binding.borrow_mut().take();
        if let Some(mut binding) = binding {
            binding.unsubscribe();
        }
    }

    pub(crate) fn links(&self) -> &RefCell<Vec<Rc<BidirectionalLink<T>>>> {
        &self.inner.links
    }
}

impl<T: Clone + PartialEq + 'static> Property<T> {
    /// Create an unnamed property.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::build(None, value)
    }

    /// Create a property with a diagnostic name.
    #[must_use]
    pub fn named(name: impl Into<String>, value: T) -> Self {
        Self::build(Some(name.into()), value)
    }

    fn build(name: Option<String>, value: T) -> Self {
        Self {
            inner: Rc::new(PropertyInner {
                name,
                value: RefCell::new(value),
                version: Cell::new(0),
                validator: RefCell::new(None),
                binding: RefCell::new(None),
                links: RefCell::new(Vec::new()),
                listeners: ListenerManager::new(),
            }),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set the value.
    ///
    /// # Panics
    ///
    /// Panics if the property is bound or the validator rejects the value.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    /// Set the value, reporting why it was refused.
    pub fn try_set(&self, value: T) -> Result<(), PropertyError> {
        if self.is_bound() {
            return Err(PropertyError::Bound {
                name: self.inner.name.clone(),
            });
        }
        self.assign(value)
    }

    /// Modify a copy of the value and write it back.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<(), PropertyError> {
        let mut next = self.get();
        f(&mut next);
        self.try_set(next)
    }

    /// Write bypassing the bound check. Used by the binding that owns this
    /// property.
    fn assign(&self, value: T) -> Result<(), PropertyError> {
        let validator = self.inner.validator.borrow().clone();
        if let Some(validate) = validator {
            validate(&value).map_err(|reason| PropertyError::Rejected { reason })?;
        }
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return Ok(());
            }
            *current = value;
        }
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.listeners.fire_value_changed(self);
        Ok(())
    }

    /// Register a change listener. Its first old value is the current value.
    pub fn add_change_listener(&self, listener: ChangeListener<T>) {
        self.inner.listeners.add_change_listener(self, listener);
    }

    /// Call `f` on every invalidation until the subscription ends.
    pub fn subscribe_invalidations(
        &self,
        f: impl Fn(&dyn ObservableValue<T>) + 'static,
    ) -> Subscription {
        let listener = InvalidationListener::new(f);
        self.add_invalidation_listener(listener.clone());
        let property = self.downgrade();
        Subscription::new(move || {
            if let Some(property) = property.upgrade() {
                property.remove_invalidation_listener(&listener);
            }
        })
    }

    /// Call `f(old, new)` on every change until the subscription ends.
    pub fn subscribe_changes(&self, f: impl Fn(&T, &T) + 'static) -> Subscription {
        self.subscribe_change_listener(ChangeListener::new(move |_, old, new| f(old, new)))
    }

    /// Call `f(new)` on every change until the subscription ends.
    pub fn subscribe_values(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe_change_listener(ChangeListener::new(move |_, _, new| f(new)))
    }

    fn subscribe_change_listener(&self, listener: ChangeListener<T>) -> Subscription {
        self.add_change_listener(listener.clone());
        let property = self.downgrade();
        Subscription::new(move || {
            if let Some(property) = property.upgrade() {
                property.remove_change_listener(&listener);
            }
        })
    }

    /// Follow `source`: take its value now and on every change.
    ///
    /// Replaces an existing unidirectional binding. Fails without changes
    /// if `source` is this property or the validator rejects its value.
    pub fn bind(&self, source: &Property<T>) -> Result<(), PropertyError> {
        if self.ptr_eq(source) {
            return Err(PropertyError::SelfBinding);
        }
        self.assign(source.get())?;
        self.unbind();

        let target = self.downgrade();
        let listener = ChangeListener::new(move |_, _, new: &T| {
            let Some(target) = target.upgrade() else {
                return;
            };
            if let Err(err) = target.assign(new.clone()) {
                tracing::warn!(error = %err, "bound property rejected its source value");
                uncaught::report(ListenerError::Failed(Box::new(err)));
            }
        });
        let subscription = source.subscribe_change_listener(listener);
        *self.inner.binding.borrow_mut() = Some(subscription);
        tracing::debug!(target = ?self.name(), source = ?source.name(), "property bound");
        Ok(())
    }
}

impl<T: Clone + PartialEq + 'static> ObservableValue<T> for Property<T> {
    fn value(&self) -> T {
        self.get()
    }

    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
