//! Environment defaults and tunables for the session layer.

use std::time::Duration;

use crate::Environment;

/// Timeout applied to every backend request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for the push unregister call made during logout.
pub const DEFAULT_PUSH_UNREGISTER_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for obtaining a device token and registering it.
pub const DEFAULT_PUSH_REGISTER_TIMEOUT: Duration = Duration::from_secs(8);

/// A token is treated as expired this many seconds before its `exp`.
pub const DEFAULT_REFRESH_SKEW_SECS: u64 = 30;

impl Environment {
    /// Base URL of the ordering backend for this environment.
    #[must_use]
    pub const fn backend_url(&self) -> &'static str {
        match self {
            Self::Staging => "https://api.stage.orderkit.app",
            Self::Production => "https://api.orderkit.app",
        }
    }
}

/// Tunables for [`crate::session::SessionManager`] and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base URL of the ordering backend.
    pub backend_url: String,
    /// Timeout applied to every backend request.
    pub request_timeout: Duration,
    /// Retries for transient failures (429, 5xx, connect/timeout). Total attempts = retries + 1.
    pub transient_retries: u32,
    /// Seconds before `exp` at which a token counts as expired.
    pub refresh_skew_secs: u64,
    /// Bound on push registration at login.
    pub push_register_timeout: Duration,
    /// Bound on push unregistration at logout.
    pub push_unregister_timeout: Duration,
}

impl SessionConfig {
    /// Defaults for the given environment.
    #[must_use]
    pub fn from_environment(environment: &Environment) -> Self {
        Self {
            backend_url: environment.backend_url().to_string(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: Environment::Production.backend_url().to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transient_retries: 2,
            refresh_skew_secs: DEFAULT_REFRESH_SKEW_SECS,
            push_register_timeout: DEFAULT_PUSH_REGISTER_TIMEOUT,
            push_unregister_timeout: DEFAULT_PUSH_UNREGISTER_TIMEOUT,
        }
    }
}
