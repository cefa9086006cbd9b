#![forbid(unsafe_code)]

//! Per-thread sink for listener failures.
//!
//! A panicking listener must not stop the remaining listeners from being
//! notified, and must not unwind into the code that changed the value. The
//! notification driver catches the panic and hands it here. By default the
//! failure is logged with `tracing::error!`; tests and applications install
//! their own handler with [`set_uncaught_handler`].

use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

/// A listener failure nobody above the notification could handle.
#[derive(Debug)]
pub enum ListenerError {
    /// A listener panicked.
    Panicked {
        observable: Option<String>,
        message: String,
    },
    /// A listener (or binding) failed with an error value.
    Failed(Box<dyn Error>),
}

impl ListenerError {
    /// Panic message, if this is a panic report.
    #[must_use]
    pub fn panic_message(&self) -> Option<&str> {
        match self {
            Self::Panicked { message, .. } => Some(message),
            Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panicked {
                observable: Some(name),
                message,
            } => write!(f, "listener of {name} panicked: {message}"),
            Self::Panicked {
                observable: None,
                message,
            } => write!(f, "listener panicked: {message}"),
            Self::Failed(err) => write!(f, "listener failed: {err}"),
        }
    }
}

impl Error for ListenerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Failed(err) => Some(err.as_ref()),
            Self::Panicked { .. } => None,
        }
    }
}

/// Handler invoked for every reported failure on the installing thread.
pub type UncaughtHandler = Rc<dyn Fn(&ListenerError)>;

thread_local! {
    static HANDLER: RefCell<Option<UncaughtHandler>> = const { RefCell::new(None) };
}

/// Install a handler for this thread, returning the previous one.
pub fn set_uncaught_handler(handler: impl Fn(&ListenerError) + 'static) -> Option<UncaughtHandler> {
    let handler: UncaughtHandler = Rc::new(handler);
    HANDLER
        .try_with(|slot| slot.borrow_mut().replace(handler))
        .ok()
        .flatten()
}

/// Remove this thread's handler, restoring the logging default.
pub fn take_uncaught_handler() -> Option<UncaughtHandler> {
    HANDLER
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

/// Deliver a failure to this thread's handler.
///
/// The handler runs outside any internal borrow, so it may itself install
/// or remove handlers.
pub fn report(error: ListenerError) {
    let handler = HANDLER.try_with(|slot| slot.borrow().clone()).ok().flatten();
    match handler {
        Some(handler) => handler(&error),
        None => tracing::error!(error = %error, "uncaught listener error"),
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
