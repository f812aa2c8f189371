//! Error types for local storage components.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the credential store and the local caches.
#[derive(Debug, Error, uniffi::Error)]
pub enum StorageError {
    /// Errors coming from a platform keystore.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// Errors coming from the local cache database.
    #[error("cache db error: {0}")]
    CacheDb(String),

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Input rejected before any I/O was performed.
    #[error("invalid input for {attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending attribute.
        attribute: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The addressed cache entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage mutex was poisoned by a panicking holder.
    #[error("storage lock error: {0}")]
    Lock(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl StorageError {
    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for StorageError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}
