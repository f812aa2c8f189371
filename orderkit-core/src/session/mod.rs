//! Session lifecycle: sign-in and registration, token refresh, authenticated
//! backend calls and logout.
//!
//! [`SessionManager`] is the only writer of the bearer token. Every token it
//! obtains from the identity provider is persisted through the
//! [`CredentialStore`] before use.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::backend::{BackendApi, NewProfile, ProfileUpdate, UserProfile};
use crate::defaults::SessionConfig;
use crate::error::OrderKitError;
use crate::identity::{current_unix_secs, IdToken, IdentityProvider, PrincipalCredentials};
use crate::push::PushRegistrationCoordinator;
use crate::storage::CredentialStore;

mod profile_cache;
mod profile_sync;

use profile_cache::ProfileCache;
pub use profile_sync::{ProfileStepRunner, ProfileSyncPlan, ProfileSyncStep, StepOutcome};

/// Owns the authenticated session.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    backend: Arc<dyn BackendApi>,
    credentials: Arc<CredentialStore>,
    profile_cache: ProfileCache,
    push: Option<Arc<PushRegistrationCoordinator>>,
    config: SessionConfig,
    current: Mutex<Option<IdToken>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("push", &self.push)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager without push registration.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        backend: Arc<dyn BackendApi>,
        credentials: Arc<CredentialStore>,
        config: SessionConfig,
    ) -> Self {
        let profile_cache = ProfileCache::new(credentials.plain_store());
        Self {
            provider,
            backend,
            credentials,
            profile_cache,
            push: None,
            config,
            current: Mutex::new(None),
        }
    }

    /// Notifies `push` when sessions start and end.
    #[must_use]
    pub fn with_push(mut self, push: Arc<PushRegistrationCoordinator>) -> Self {
        self.push = Some(push);
        self
    }

    /// Signs in and resolves the backend profile (fetch, else create, else login).
    ///
    /// # Errors
    ///
    /// - [`OrderKitError::InvalidCredentials`] if the provider rejects the credentials.
    /// - [`OrderKitError::AccountDeactivated`] if the profile is inactive; the
    ///   provider session and stored credential are discarded.
    /// - Any other backend, provider or storage failure of the profile steps.
    pub async fn acquire(
        &self,
        credentials: &PrincipalCredentials,
    ) -> Result<UserProfile, OrderKitError> {
        self.provider.sign_in(credentials).await?;
        let new_profile = NewProfile {
            name: display_name(&credentials.email),
            email: credentials.email.clone(),
            phone: None,
        };
        self.establish(&ProfileSyncPlan::sign_in(), new_profile)
            .await
    }

    /// Creates the principal, then its backend profile (create, else login).
    ///
    /// # Errors
    ///
    /// Same as [`Self::acquire`].
    pub async fn register(
        &self,
        credentials: &PrincipalCredentials,
        profile: NewProfile,
    ) -> Result<UserProfile, OrderKitError> {
        self.provider.sign_up(credentials).await?;
        self.establish(&ProfileSyncPlan::register(), profile).await
    }

    async fn establish(
        &self,
        plan: &ProfileSyncPlan,
        new_profile: NewProfile,
    ) -> Result<UserProfile, OrderKitError> {
        let runner = BackendStepRunner {
            session: self,
            new_profile,
        };
        let profile = match plan.resolve(&runner).await {
            Ok(profile) => profile,
            Err(err) => {
                log::warn!("profile sync failed: {err}");
                self.abandon().await;
                return Err(err);
            }
        };

        if profile.is_inactive() {
            log::warn!("sign-in refused for deactivated account {}", profile.id);
            self.abandon().await;
            return Err(OrderKitError::AccountDeactivated);
        }

        if let Err(err) = self.profile_cache.save(&profile) {
            log::warn!("failed to cache profile: {err}");
        }
        log::info!("session established for {}", profile.id);

        if let Some(push) = &self.push {
            if let Some(token) = self.current_token() {
                push.on_session_established(token.expose()).await;
            }
        }
        Ok(profile)
    }

    /// Drops a half-established session along with any earlier push pairing,
    /// then signs out and wipes local state.
    async fn abandon(&self) {
        if let Some(push) = &self.push {
            push.on_session_teardown(None).await;
        }
        if let Err(err) = self.provider.sign_out().await {
            log::warn!("provider sign-out failed: {err}");
        }
        if let Err(err) = self.clear_local_session() {
            log::warn!("failed to clear local session: {err}");
        }
    }

    /// A token usable for the next backend call, refreshing it first if the
    /// provider considers it expired.
    ///
    /// # Errors
    ///
    /// [`OrderKitError::NotAuthenticated`] if no token is held or stored, or
    /// [`OrderKitError::SessionExpired`] if a needed refresh failed.
    pub async fn get_valid_token(&self) -> Result<String, OrderKitError> {
        let token = self
            .current_token()
            .or_else(|| self.restore_token())
            .ok_or(OrderKitError::NotAuthenticated)?;
        if self.provider.is_expired(
            &token,
            current_unix_secs(),
            self.config.refresh_skew_secs,
        ) {
            log::debug!("token expired, refreshing before use");
            return self.refresh().await;
        }
        Ok(token.expose().to_string())
    }

    /// Forces the provider to mint a new token, persists it and makes it current.
    ///
    /// # Errors
    ///
    /// [`OrderKitError::SessionExpired`] if the provider cannot renew the
    /// token, or a storage error if it cannot be persisted anywhere.
    pub async fn refresh(&self) -> Result<String, OrderKitError> {
        match self.issue_token().await {
            Ok(token) => Ok(token),
            Err(err @ OrderKitError::Storage(_)) => Err(err),
            Err(err) => {
                log::warn!("token refresh failed: {err}");
                Err(OrderKitError::SessionExpired)
            }
        }
    }

    async fn issue_token(&self) -> Result<String, OrderKitError> {
        let token = self.provider.id_token(true).await?;
        let raw = token.expose().to_string();
        let backend = self.credentials.save(raw.clone())?;
        log::debug!("token persisted to {backend:?} keystore");
        *self.lock_current() = Some(token);
        Ok(raw)
    }

    /// Runs `request` with a valid token. If the backend rejects the token,
    /// refreshes once and retries once; a second rejection is
    /// [`OrderKitError::SessionExpired`].
    ///
    /// # Errors
    ///
    /// Any error of the token lookup, the refresh, or `request` itself.
    pub async fn execute_authenticated<T, F, Fut>(&self, request: F) -> Result<T, OrderKitError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, OrderKitError>>,
    {
        let token = self.get_valid_token().await?;
        match request(token).await {
            Err(err) if err.is_unauthorized() => {
                log::info!("request unauthorized, refreshing token and retrying once");
                let token = self.refresh().await?;
                match request(token).await {
                    Err(err) if err.is_unauthorized() => {
                        log::warn!("retried request still unauthorized: {err}");
                        Err(OrderKitError::SessionExpired)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Updates the user's profile and the local copy of it.
    ///
    /// # Errors
    ///
    /// Any error of [`Self::execute_authenticated`].
    pub async fn update_profile(
        &self,
        update: ProfileUpdate,
    ) -> Result<UserProfile, OrderKitError> {
        let backend = &self.backend;
        let update = &update;
        let profile = self
            .execute_authenticated(|token| async move {
                backend.update_profile(&token, update).await
            })
            .await?;
        if let Err(err) = self.profile_cache.save(&profile) {
            log::warn!("failed to cache updated profile: {err}");
        }
        Ok(profile)
    }

    /// All users; admin only.
    ///
    /// # Errors
    ///
    /// Any error of [`Self::execute_authenticated`].
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, OrderKitError> {
        let backend = &self.backend;
        self.execute_authenticated(|token| async move { backend.list_users(&token).await })
            .await
    }

    /// The locally cached profile of the signed-in user.
    #[must_use]
    pub fn current_profile(&self) -> Option<UserProfile> {
        self.profile_cache.load()
    }

    /// Restores the stored token and cached profile at app start, without
    /// touching the network. Returns the profile if a full session was found.
    pub fn restore(&self) -> Option<UserProfile> {
        self.restore_token()?;
        self.profile_cache.load()
    }

    fn restore_token(&self) -> Option<IdToken> {
        let stored = self.credentials.load()?;
        log::debug!("restored token from {:?} keystore", stored.backend);
        let token = IdToken::from_jwt(stored.token);
        *self.lock_current() = Some(token.clone());
        Some(token)
    }

    /// Ends the session: push unregister and provider sign-out are best effort,
    /// the stored credential and cached profile are cleared regardless.
    ///
    /// # Errors
    ///
    /// Returns a storage error only if local state could not be cleared.
    pub async fn logout(&self) -> Result<(), OrderKitError> {
        let token = self
            .current_token()
            .map(|token| token.expose().to_string())
            .or_else(|| self.credentials.load().map(|stored| stored.token));

        if let Some(push) = &self.push {
            push.on_session_teardown(token.as_deref()).await;
        }
        if let Err(err) = self.provider.sign_out().await {
            log::warn!("provider sign-out failed during logout: {err}");
        }
        self.clear_local_session()?;
        log::info!("logged out");
        Ok(())
    }

    fn clear_local_session(&self) -> Result<(), OrderKitError> {
        *self.lock_current() = None;
        let credentials = self.credentials.clear();
        let profile = self.profile_cache.clear();
        credentials.and(profile).map_err(Into::into)
    }

    fn current_token(&self) -> Option<IdToken> {
        self.lock_current().clone()
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<IdToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs profile sync steps against the backend, each with a freshly issued
/// and persisted token.
struct BackendStepRunner<'a> {
    session: &'a SessionManager,
    new_profile: NewProfile,
}

#[async_trait]
impl ProfileStepRunner for BackendStepRunner<'_> {
    async fn run(&self, step: ProfileSyncStep) -> Result<StepOutcome, OrderKitError> {
        let token = self.session.issue_token().await?;
        let backend = &self.session.backend;
        let result = match step {
            ProfileSyncStep::FetchProfile => backend.fetch_profile(&token).await,
            ProfileSyncStep::CreateProfile => {
                backend.create_profile(&token, &self.new_profile).await
            }
            ProfileSyncStep::Login => backend.login(&token).await,
        };
        StepOutcome::classify(result)
    }
}

/// Default display name for a profile created at sign-in.
fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::AccountStatus;
    use crate::push::PushState;
    use crate::storage::credential_store::{LEGACY_TOKEN_KEY, SECURE_TOKEN_KEY};
    use crate::storage::{KeyValueStore, MemoryKeyValueStore};
    use crate::test_support::{
        network_error, profile, unauthorized, MockBackend, MockIdentity, MockPushPlatform,
    };

    struct Harness {
        identity: Arc<MockIdentity>,
        backend: Arc<MockBackend>,
        secure: Arc<MemoryKeyValueStore>,
        plain: Arc<MemoryKeyValueStore>,
        push: Arc<PushRegistrationCoordinator>,
        session: SessionManager,
    }

    fn harness() -> Harness {
        let identity = Arc::new(MockIdentity::default());
        let backend = Arc::new(MockBackend::default());
        let secure = Arc::new(MemoryKeyValueStore::new());
        let plain = Arc::new(MemoryKeyValueStore::new());
        let credentials = Arc::new(CredentialStore::new(secure.clone(), plain.clone()));
        let config = SessionConfig {
            push_unregister_timeout: std::time::Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let push = Arc::new(PushRegistrationCoordinator::new(
            Arc::new(MockPushPlatform::default()),
            backend.clone(),
            &config,
        ));
        let session = SessionManager::new(identity.clone(), backend.clone(), credentials, config)
            .with_push(Arc::clone(&push));
        Harness {
            identity,
            backend,
            secure,
            plain,
            push,
            session,
        }
    }

    fn credentials() -> PrincipalCredentials {
        PrincipalCredentials::new("ada@example.com", "correct horse").unwrap()
    }

    #[tokio::test]
    async fn test_acquire_persists_token_caches_profile_and_registers_push() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Ok(profile(AccountStatus::Active))]);

        let resolved = h.session.acquire(&credentials()).await.unwrap();

        assert_eq!(resolved.id, "u-1");
        assert_eq!(
            h.secure.get(SECURE_TOKEN_KEY.to_string()).unwrap(),
            Some("token-1".to_string())
        );
        assert_eq!(h.session.current_profile(), Some(resolved));
        assert_eq!(
            h.push.state(),
            PushState::Registered {
                device_token: "device-1".to_string()
            }
        );
        assert_eq!(
            h.backend.calls(),
            vec![
                ("me", "token-1".to_string()),
                ("update-fcm-token", "token-1/device-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_acquire_falls_back_with_a_fresh_token_per_step() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Err(OrderKitError::ProfileNotFound)]);
        MockBackend::script(
            &h.backend.create,
            vec![Err(OrderKitError::Conflict("exists".to_string()))],
        );
        MockBackend::script(&h.backend.login, vec![Ok(profile(AccountStatus::Active))]);

        h.session.acquire(&credentials()).await.unwrap();

        let calls = h.backend.calls();
        assert_eq!(
            calls[..3],
            [
                ("me", "token-1".to_string()),
                ("signup", "token-2".to_string()),
                ("login", "token-3".to_string()),
            ]
        );
        assert_eq!(h.session.get_valid_token().await.unwrap(), "token-3");
    }

    #[tokio::test]
    async fn test_register_uses_create_then_login() {
        let h = harness();
        MockBackend::script(
            &h.backend.create,
            vec![Err(OrderKitError::Conflict("exists".to_string()))],
        );
        MockBackend::script(&h.backend.login, vec![Ok(profile(AccountStatus::Active))]);

        let new_profile = NewProfile {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        };
        h.session
            .register(&credentials(), new_profile)
            .await
            .unwrap();
        assert_eq!(
            h.backend.endpoints()[..2],
            ["signup", "login"]
        );
    }

    #[tokio::test]
    async fn test_deactivated_account_is_signed_out_and_cleared() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Ok(profile(AccountStatus::Inactive))]);

        let err = h.session.acquire(&credentials()).await.unwrap_err();

        assert!(matches!(err, OrderKitError::AccountDeactivated));
        assert_eq!(h.identity.sign_outs(), 1);
        assert!(!h.secure.contains(SECURE_TOKEN_KEY));
        assert!(!h.plain.contains(LEGACY_TOKEN_KEY));
        assert!(h.session.current_profile().is_none());
        assert_eq!(h.push.state(), PushState::Unregistered);
        assert!(matches!(
            h.session.get_valid_token().await.unwrap_err(),
            OrderKitError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn test_rejected_credentials_touch_nothing() {
        let h = harness();
        h.identity.fail_sign_in();
        let err = h.session.acquire(&credentials()).await.unwrap_err();
        assert!(matches!(err, OrderKitError::InvalidCredentials(_)));
        assert!(h.backend.calls().is_empty());
        assert_eq!(h.identity.issued(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_does_not_fail_login() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Ok(profile(AccountStatus::Active))]);
        MockBackend::script(&h.backend.register_push, vec![Err(network_error())]);

        assert!(h.session.acquire(&credentials()).await.is_ok());
        assert_eq!(h.push.state(), PushState::Unregistered);
    }

    #[tokio::test]
    async fn test_second_sign_in_moves_push_registration_to_new_session() {
        let h = harness();
        MockBackend::script(
            &h.backend.fetch,
            vec![
                Ok(profile(AccountStatus::Active)),
                Ok(profile(AccountStatus::Active)),
            ],
        );

        h.session.acquire(&credentials()).await.unwrap();
        h.session.acquire(&credentials()).await.unwrap();

        assert_eq!(
            h.backend.calls(),
            vec![
                ("me", "token-1".to_string()),
                ("update-fcm-token", "token-1/device-1".to_string()),
                ("me", "token-2".to_string()),
                ("remove-fcm-token", "token-1".to_string()),
                ("update-fcm-token", "token-2/device-1".to_string()),
            ]
        );
        assert_eq!(
            h.push.state(),
            PushState::Registered {
                device_token: "device-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_one_unauthorized_refreshes_once_and_retries_once() {
        let h = harness();
        h.secure
            .set(SECURE_TOKEN_KEY.to_string(), "stored".to_string())
            .unwrap();
        let attempts = AtomicUsize::new(0);

        let result = h
            .session
            .execute_authenticated(|token| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        assert_eq!(token, "stored");
                        Err(unauthorized())
                    } else {
                        Ok(token)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(h.identity.issued(), 1);
        assert_eq!(result, "token-1");
        assert_eq!(
            h.secure.get(SECURE_TOKEN_KEY.to_string()).unwrap(),
            Some("token-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_session_expired_without_third_attempt() {
        let h = harness();
        h.secure
            .set(SECURE_TOKEN_KEY.to_string(), "stored".to_string())
            .unwrap();
        let attempts = AtomicUsize::new(0);

        let err = h
            .session
            .execute_authenticated(|_token| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(unauthorized()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrderKitError::SessionExpired));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(h.identity.issued(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_session_expired() {
        let h = harness();
        h.secure
            .set(SECURE_TOKEN_KEY.to_string(), "stored".to_string())
            .unwrap();
        h.identity.fail_refresh();

        let err = h
            .session
            .execute_authenticated(|_token| async { Err::<(), _>(unauthorized()) })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderKitError::SessionExpired));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let h = harness();
        h.secure
            .set(SECURE_TOKEN_KEY.to_string(), "stored".to_string())
            .unwrap();
        let attempts = AtomicUsize::new(0);

        let err = h
            .session
            .execute_authenticated(|_token| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(network_error()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrderKitError::NetworkError { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(h.identity.issued(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_before_use() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Ok(profile(AccountStatus::Active))]);
        h.identity.set_expires_at(Some(1));
        h.session.acquire(&credentials()).await.unwrap();
        let issued = h.identity.issued();

        h.identity.set_expires_at(None);
        let token = h.session.get_valid_token().await.unwrap();
        assert_eq!(h.identity.issued(), issued + 1);
        assert_eq!(token, format!("token-{}", issued + 1));
    }

    #[tokio::test]
    async fn test_token_is_restored_from_legacy_store_and_migrated() {
        let h = harness();
        h.plain
            .set(LEGACY_TOKEN_KEY.to_string(), "legacy".to_string())
            .unwrap();

        assert_eq!(h.session.get_valid_token().await.unwrap(), "legacy");
        assert!(h.secure.contains(SECURE_TOKEN_KEY));
        assert!(!h.plain.contains(LEGACY_TOKEN_KEY));
    }

    #[tokio::test]
    async fn test_restore_returns_cached_profile_without_network() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Ok(profile(AccountStatus::Active))]);
        h.session.acquire(&credentials()).await.unwrap();
        let calls = h.backend.calls().len();

        let restored = SessionManager::new(
            h.identity.clone(),
            h.backend.clone(),
            Arc::new(CredentialStore::new(h.secure.clone(), h.plain.clone())),
            SessionConfig::default(),
        );
        assert_eq!(restored.restore(), Some(profile(AccountStatus::Active)));
        assert_eq!(restored.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(h.backend.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_update_profile_refreshes_cache() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Ok(profile(AccountStatus::Active))]);
        h.session.acquire(&credentials()).await.unwrap();

        let mut updated = profile(AccountStatus::Active);
        updated.phone = Some("+1 555 0100".to_string());
        MockBackend::script(&h.backend.update, vec![Ok(updated.clone())]);

        let result = h
            .session
            .update_profile(ProfileUpdate {
                phone: updated.phone.clone(),
                ..ProfileUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(result, updated);
        assert_eq!(h.session.current_profile(), Some(updated));
    }

    #[tokio::test]
    async fn test_list_users_retries_after_refresh() {
        let h = harness();
        h.secure
            .set(SECURE_TOKEN_KEY.to_string(), "stored".to_string())
            .unwrap();
        MockBackend::script(
            &h.backend.users,
            vec![Err(unauthorized()), Ok(vec![profile(AccountStatus::Active)])],
        );

        let users = h.session.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(
            h.backend.calls(),
            vec![
                ("users", "stored".to_string()),
                ("users", "token-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_logout_clears_everything_even_when_remote_calls_fail() {
        let h = harness();
        MockBackend::script(&h.backend.fetch, vec![Ok(profile(AccountStatus::Active))]);
        h.session.acquire(&credentials()).await.unwrap();

        MockBackend::script(&h.backend.unregister_push, vec![Err(network_error())]);
        h.identity.fail_sign_out();

        h.session.logout().await.unwrap();

        assert_eq!(h.push.state(), PushState::Unregistered);
        assert_eq!(h.identity.sign_outs(), 1);
        assert!(!h.secure.contains(SECURE_TOKEN_KEY));
        assert!(h.session.current_profile().is_none());
        assert!(matches!(
            h.session.get_valid_token().await.unwrap_err(),
            OrderKitError::NotAuthenticated
        ));
        assert_eq!(
            h.backend.calls().last().map(|(endpoint, _)| *endpoint),
            Some("remove-fcm-token")
        );
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("ada@example.com"), "ada");
        assert_eq!(display_name("nobody"), "nobody");
    }
}
