#![forbid(unsafe_code)]

//! Error types for properties and bindings.

use std::fmt;

/// Why a property refused a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The property is bound to another observable and cannot be set.
    Bound { name: Option<String> },
    /// The property's validator rejected the value.
    Rejected { reason: String },
    /// A property cannot be bound to itself.
    SelfBinding,
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound { name: Some(name) } => write!(f, "{name} is bound and cannot be set"),
            Self::Bound { name: None } => write!(f, "a bound value cannot be set"),
            Self::Rejected { reason } => write!(f, "value rejected: {reason}"),
            Self::SelfBinding => write!(f, "cannot bind a property to itself"),
        }
    }
}

impl std::error::Error for PropertyError {}

/// Binding setup or propagation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Both ends of the binding are the same observable.
    SelfBinding,
    /// The two observables are already bound to each other.
    AlreadyBound,
    /// The other side rejected a value; the source was rolled back.
    PropagationFailed { cause: PropertyError },
    /// The other side rejected a value and the rollback failed too; the
    /// binding was removed.
    RollbackFailed {
        cause: PropertyError,
        rollback: PropertyError,
    },
    /// A content-bound collection was modified directly; the binding was
    /// removed.
    IllegalContentModification { target: Option<String> },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfBinding => write!(f, "cannot bind an observable to itself"),
            Self::AlreadyBound => write!(f, "observables are already bound"),
            Self::PropagationFailed { cause } => {
                write!(f, "binding propagation failed, source rolled back: {cause}")
            }
            Self::RollbackFailed { cause, rollback } => write!(
                f,
                "binding propagation failed ({cause}) and rollback failed ({rollback}); binding removed"
            ),
            Self::IllegalContentModification { target: Some(name) } => write!(
                f,
                "illegal modification of content-bound {name}; binding removed"
            ),
            Self::IllegalContentModification { target: None } => write!(
                f,
                "illegal modification of a content-bound collection; binding removed"
            ),
        }
    }
}

impl std::error::Error for BindingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PropagationFailed { cause } | Self::RollbackFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
