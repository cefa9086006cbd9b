#![forbid(unsafe_code)]

//! Bindings that keep observables synchronized.
//!
//! - [`Property::bind`](crate::Property::bind): one-way, the bound property
//!   follows its source and refuses direct writes.
//! - [`bind_bidirectional`]: two properties follow each other.
//! - [`bind_content`] / [`bind_content_bidirectional`]: collection contents
//!   mirrored change by change.
//!
//! # Invariants
//!
//! 1. Binding an observable to itself, or binding the same pair twice, fails
//!    before any state changes.
//! 2. Unbinding is idempotent.
//! 3. A binding holds its endpoints weakly and owns nothing but its
//!    listeners; dropping either endpoint ends it.

pub mod bidirectional;
pub mod content;

pub use bidirectional::{bind_bidirectional, is_bound_bidirectionally, unbind_bidirectional};
pub use content::{
    ContentCollection, ContentLink, LinkId, bind_content, bind_content_bidirectional,
    is_content_bound, unbind_content, unbind_content_bidirectional,
};
