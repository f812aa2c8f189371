use thiserror::Error;

use crate::storage::StorageError;

/// Error outputs from `OrderKit`
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum OrderKitError {
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending attribute
        attribute: String,
        /// Why the value was rejected
        reason: String,
    },
    /// Connectivity, timeout or unexpected backend response. Retryable by user action.
    #[error("network_error: {url} (status {status:?}): {error}")]
    NetworkError {
        /// URL of the failed request
        url: String,
        /// HTTP status if a response was received
        status: Option<u16>,
        /// Details of the failure
        error: String,
    },
    /// The backend rejected the bearer token (401/403).
    #[error("unauthorized: {url}")]
    Unauthorized {
        /// URL of the rejected request
        url: String,
    },
    /// The token could not be renewed, or the single refresh-and-retry was exhausted.
    #[error("session_expired")]
    SessionExpired,
    /// No credential is available; the user has to log in.
    #[error("not_authenticated")]
    NotAuthenticated,
    /// The identity provider rejected the principal credentials.
    #[error("invalid_credentials: {0}")]
    InvalidCredentials(String),
    /// The backend profile is marked inactive.
    #[error("account_deactivated")]
    AccountDeactivated,
    /// The backend has no profile for the authenticated identity.
    #[error("profile_not_found")]
    ProfileNotFound,
    /// The backend already holds the resource being created.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Every step of a profile sync plan ended without a profile.
    #[error("profile_unavailable")]
    ProfileUnavailable,
    /// The identity provider failed for a reason other than bad credentials.
    #[error("identity_provider_error: {0}")]
    IdentityProvider(String),
    /// Unexpected error serializing or parsing information
    #[error("serialization_error: {error}")]
    SerializationError {
        /// Details of the failure
        error: String,
    },
    /// Local storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OrderKitError {
    /// Whether the backend rejected the token, the trigger for a refresh-and-retry.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for OrderKitError {
    fn from(error: reqwest::Error) -> Self {
        Self::NetworkError {
            url: error
                .url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            status: error.status().map(|status| status.as_u16()),
            error: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for OrderKitError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError {
            error: error.to_string(),
        }
    }
}
