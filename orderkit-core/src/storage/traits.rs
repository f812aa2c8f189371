//! Platform interfaces for credential storage.

use super::error::StorageResult;

/// String key-value persistence provided by the host platform.
///
/// Two instances back the [`super::CredentialStore`]:
/// - the *secure* store (iOS Keychain, Android `EncryptedSharedPreferences`),
/// - the *plain* store (`UserDefaults`, `SharedPreferences`), used as a
///   fallback when the secure store is unavailable and as the location of the
///   legacy token written by older app versions.
#[uniffi::export(with_foreign)]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform store cannot be read.
    fn get(&self, key: String) -> StorageResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, key: String, value: String) -> StorageResult<()>;

    /// Deletes the value under `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, key: String) -> StorageResult<()>;
}
