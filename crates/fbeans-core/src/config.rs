#![forbid(unsafe_code)]

//! Notification tunables.
//!
//! Configuration is process-wide and resolved once: either installed
//! explicitly with [`NotifyConfig::install`] before the first notification,
//! or read from the environment on first use.
//!
//! | Variable | Effect | Default |
//! |----------|--------|---------|
//! | `FBEANS_MAX_REENTRANCY` | reentrant notifications per observable before [`NonConvergence`](crate::NonConvergence) | 32 |
//! | `FBEANS_REPORT_PANICS` | `0`/`false` lets listener panics unwind instead of reporting them | on |

use std::sync::OnceLock;

/// Environment variable overriding [`NotifyConfig::max_reentrancy`].
pub const ENV_MAX_REENTRANCY: &str = "FBEANS_MAX_REENTRANCY";
/// Environment variable overriding [`NotifyConfig::report_listener_panics`].
pub const ENV_REPORT_PANICS: &str = "FBEANS_REPORT_PANICS";

static GLOBAL: OnceLock<NotifyConfig> = OnceLock::new();

/// Notification tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyConfig {
    /// How deep one observable may reenter its own notification.
    pub max_reentrancy: usize,
    /// Catch listener panics and send them to the uncaught handler.
    pub report_listener_panics: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_reentrancy: 32,
            report_listener_panics: true,
        }
    }
}

impl NotifyConfig {
    /// Set the reentrancy limit (at least 1).
    #[must_use]
    pub fn with_max_reentrancy(mut self, limit: usize) -> Self {
        self.max_reentrancy = limit.max(1);
        self
    }

    /// Choose whether listener panics are reported or propagated.
    #[must_use]
    pub fn with_report_listener_panics(mut self, report: bool) -> Self {
        self.report_listener_panics = report;
        self
    }

    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `get_env`. Unparseable values are ignored.
    #[must_use]
    pub fn from_env_with(get_env: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(limit) = get_env(ENV_MAX_REENTRANCY)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|limit| *limit > 0)
        {
            config.max_reentrancy = limit;
        }
        if let Some(report) = get_env(ENV_REPORT_PANICS).and_then(|v| env_flag(&v)) {
            config.report_listener_panics = report;
        }
        config
    }

    /// The process-wide configuration.
    #[must_use]
    pub fn global() -> Self {
        *GLOBAL.get_or_init(Self::from_env)
    }

    /// Make `self` the process-wide configuration.
    ///
    /// Fails, returning `self`, once the configuration has been resolved.
    pub fn install(self) -> Result<(), Self> {
        GLOBAL.set(self)
    }
}

fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
