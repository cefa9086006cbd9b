#![forbid(unsafe_code)]

//! Logging facade.
//!
//! The crate logs through `tracing` and never installs a subscriber on its
//! own. Events:
//!
//! | Level | Event |
//! |-------|-------|
//! | `error` | non-convergent notification, uncaught listener failure (default handler) |
//! | `warn` | panicking subscription cleanup, binding rollback |
//! | `debug` | reaper passes, binding lifecycle |
//! | `trace` | list lock/compaction |
//!
//! With the `tracing-json` feature, [`init_json`] installs a JSON subscriber
//! filtered by `FBEANS_LOG` (default `warn`).

pub use tracing::{debug, error, info, trace, warn};

/// Environment variable holding the `EnvFilter` directive for [`init_json`].
pub const LOG_ENV: &str = "FBEANS_LOG";

/// Install a JSON `tracing` subscriber for the process.
#[cfg(feature = "tracing-json")]
pub fn init_json() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
}
