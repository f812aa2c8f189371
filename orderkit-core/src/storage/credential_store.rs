//! Bearer credential persistence across the secure and plain keystores.

use std::sync::Arc;

use super::error::{StorageError, StorageResult};
use super::traits::KeyValueStore;

/// Key holding the bearer token in the secure keystore.
pub const SECURE_TOKEN_KEY: &str = "orderkit.auth_token";

/// Key holding the bearer token in the plain keystore. Older releases wrote the
/// token here; it is also the degraded-mode location when the secure keystore
/// refuses writes.
pub const LEGACY_TOKEN_KEY: &str = "authToken";

/// Which keystore currently holds the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum CredentialBackend {
    /// Hardware-backed / encrypted keystore.
    Secure,
    /// Unencrypted fallback keystore.
    Plain,
}

impl CredentialBackend {
    /// Write preference: secure first, plain as the degraded fallback.
    pub const SAVE_ORDER: [Self; 2] = [Self::Secure, Self::Plain];

    const fn key(self) -> &'static str {
        match self {
            Self::Secure => SECURE_TOKEN_KEY,
            Self::Plain => LEGACY_TOKEN_KEY,
        }
    }
}

/// A token read back from storage together with its location.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct StoredCredential {
    /// Opaque bearer token.
    pub token: String,
    /// Keystore the token was read from (after any migration).
    pub backend: CredentialBackend,
}

/// Persists the single bearer credential.
#[derive(uniffi::Object)]
pub struct CredentialStore {
    secure: Arc<dyn KeyValueStore>,
    plain: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish()
    }
}

impl CredentialStore {
    fn backend(&self, backend: CredentialBackend) -> &dyn KeyValueStore {
        match backend {
            CredentialBackend::Secure => self.secure.as_ref(),
            CredentialBackend::Plain => self.plain.as_ref(),
        }
    }

    /// The plain keystore, shared with other non-secret local state.
    pub(crate) fn plain_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.plain)
    }

    fn read(&self, backend: CredentialBackend) -> StorageResult<Option<String>> {
        self.backend(backend)
            .get(backend.key().to_string())
            .map(|value| value.filter(|token| !token.is_empty()))
            .inspect_err(|err| {
                log::warn!("credential read from {backend:?} keystore failed: {err}");
            })
    }

    /// Moves a legacy plain-store token into the secure store.
    ///
    /// Returns the backend that holds the token afterwards.
    fn migrate_to_secure(&self, token: &str) -> CredentialBackend {
        if let Err(err) = self
            .secure
            .set(SECURE_TOKEN_KEY.to_string(), token.to_string())
        {
            log::warn!("credential migration to secure keystore failed, keeping plain copy: {err}");
            return CredentialBackend::Plain;
        }
        if let Err(err) = self.plain.delete(LEGACY_TOKEN_KEY.to_string()) {
            // The secure copy shadows the plain one on every subsequent load.
            log::warn!("failed to delete migrated plain credential: {err}");
        }
        log::info!("migrated credential from plain to secure keystore");
        CredentialBackend::Secure
    }

    /// Deletes the copy held by the backend `written` did not go to.
    ///
    /// A stale secure copy would shadow a degraded plain write; a stale plain
    /// copy would resurface (and be migrated over the newer token) whenever the
    /// secure keystore is briefly unreadable.
    fn drop_stale_copy(&self, written: CredentialBackend) {
        let stale = match written {
            CredentialBackend::Secure => CredentialBackend::Plain,
            CredentialBackend::Plain => CredentialBackend::Secure,
        };
        if let Err(err) = self.backend(stale).delete(stale.key().to_string()) {
            log::warn!("failed to drop stale {stale:?} credential: {err}");
        }
    }
}

#[uniffi::export]
impl CredentialStore {
    /// Creates a store over the platform's secure and plain keystores.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(secure: Arc<dyn KeyValueStore>, plain: Arc<dyn KeyValueStore>) -> Self {
        Self { secure, plain }
    }

    /// Persists `token`, preferring the secure keystore.
    ///
    /// A secure-keystore failure is logged and the plain keystore is used
    /// instead; the caller only sees which backend ended up holding the token.
    ///
    /// # Errors
    ///
    /// Returns an error only if every backend refused the write.
    pub fn save(&self, token: String) -> StorageResult<CredentialBackend> {
        let mut last_error = None;
        for backend in CredentialBackend::SAVE_ORDER {
            match self
                .backend(backend)
                .set(backend.key().to_string(), token.clone())
            {
                Ok(()) => {
                    self.drop_stale_copy(backend);
                    return Ok(backend);
                }
                Err(err) => {
                    log::warn!(
                        "credential write to {backend:?} keystore failed, degrading: {err}"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            StorageError::Keystore("no credential backend configured".to_string())
        }))
    }

    /// Loads the stored token, migrating a plain-only token into the secure
    /// keystore on the way. Repeated loads after a migration are no-ops.
    ///
    /// While the secure keystore is unreadable the plain copy is returned but
    /// not migrated, since the secure keystore may hold a newer token.
    #[must_use]
    pub fn load(&self) -> Option<StoredCredential> {
        let secure_readable = match self.read(CredentialBackend::Secure) {
            Ok(Some(token)) => {
                return Some(StoredCredential {
                    token,
                    backend: CredentialBackend::Secure,
                })
            }
            Ok(None) => true,
            Err(_) => false,
        };
        let token = self.read(CredentialBackend::Plain).ok().flatten()?;
        let backend = if secure_readable {
            self.migrate_to_secure(&token)
        } else {
            CredentialBackend::Plain
        };
        Some(StoredCredential { token, backend })
    }

    /// Deletes the token from both keystores.
    ///
    /// Both deletes are always attempted.
    ///
    /// # Errors
    ///
    /// Returns the first delete failure, after both deletes were attempted.
    pub fn clear(&self) -> StorageResult<()> {
        let secure = self.secure.delete(SECURE_TOKEN_KEY.to_string());
        let plain = self.plain.delete(LEGACY_TOKEN_KEY.to_string());
        secure.and(plain)
    }
}
