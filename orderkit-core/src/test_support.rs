//! Scriptable doubles for the identity provider, backend and push platform.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{AccountStatus, BackendApi, NewProfile, ProfileUpdate, UserProfile, UserRole};
use crate::error::OrderKitError;
use crate::identity::{IdToken, IdentityProvider, PrincipalCredentials};
use crate::push::PushPlatform;

pub fn profile(status: AccountStatus) -> UserProfile {
    UserProfile {
        id: "u-1".to_string(),
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        phone: None,
        role: UserRole::Customer,
        status,
    }
}

pub fn unauthorized() -> OrderKitError {
    OrderKitError::Unauthorized {
        url: "https://api.orderkit.app/auth/users".to_string(),
    }
}

pub fn network_error() -> OrderKitError {
    OrderKitError::NetworkError {
        url: "https://api.orderkit.app".to_string(),
        status: Some(500),
        error: "boom".to_string(),
    }
}

/// Issues `token-1`, `token-2`, ... on every forced refresh.
#[derive(Default)]
pub struct MockIdentity {
    issued: AtomicUsize,
    sign_outs: AtomicUsize,
    fail_sign_in: AtomicBool,
    fail_refresh: AtomicBool,
    fail_sign_out: AtomicBool,
    expires_at: Mutex<Option<u64>>,
}

impl MockIdentity {
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn fail_sign_in(&self) {
        self.fail_sign_in.store(true, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    /// Expiry stamped on subsequently issued tokens.
    pub fn set_expires_at(&self, expires_at: Option<u64>) {
        *self.expires_at.lock().unwrap() = expires_at;
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn sign_in(&self, credentials: &PrincipalCredentials) -> Result<(), OrderKitError> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(OrderKitError::InvalidCredentials(credentials.email.clone()));
        }
        Ok(())
    }

    async fn sign_up(&self, _credentials: &PrincipalCredentials) -> Result<(), OrderKitError> {
        Ok(())
    }

    async fn id_token(&self, force_refresh: bool) -> Result<IdToken, OrderKitError> {
        let n = if force_refresh {
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(OrderKitError::IdentityProvider("refresh revoked".to_string()));
            }
            self.issued.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.issued.load(Ordering::SeqCst).max(1)
        };
        Ok(IdToken::with_expiry(
            format!("token-{n}"),
            *self.expires_at.lock().unwrap(),
        ))
    }

    async fn sign_out(&self) -> Result<(), OrderKitError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(OrderKitError::IdentityProvider("offline".to_string()));
        }
        Ok(())
    }
}

type Script<T> = Mutex<VecDeque<Result<T, OrderKitError>>>;

fn next<T>(script: &Script<T>, name: &str) -> Result<T, OrderKitError> {
    script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| panic!("unscripted backend call: {name}"))
}

/// Backend replaying per-endpoint scripts and recording `(endpoint, token)`.
#[derive(Default)]
pub struct MockBackend {
    pub fetch: Script<UserProfile>,
    pub create: Script<UserProfile>,
    pub login: Script<UserProfile>,
    pub update: Script<UserProfile>,
    pub users: Script<Vec<UserProfile>>,
    pub register_push: Script<()>,
    pub unregister_push: Script<()>,
    pub unregister_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl MockBackend {
    pub fn script<T>(script: &Script<T>, results: Vec<Result<T, OrderKitError>>) {
        script.lock().unwrap().extend(results);
    }

    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|(endpoint, _)| endpoint).collect()
    }

    fn record(&self, endpoint: &'static str, token: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint, token.to_string()));
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, OrderKitError> {
        self.record("me", token);
        next(&self.fetch, "me")
    }

    async fn create_profile(
        &self,
        token: &str,
        _profile: &NewProfile,
    ) -> Result<UserProfile, OrderKitError> {
        self.record("signup", token);
        next(&self.create, "signup")
    }

    async fn login(&self, token: &str) -> Result<UserProfile, OrderKitError> {
        self.record("login", token);
        next(&self.login, "login")
    }

    async fn update_profile(
        &self,
        token: &str,
        _update: &ProfileUpdate,
    ) -> Result<UserProfile, OrderKitError> {
        self.record("updateUser", token);
        next(&self.update, "updateUser")
    }

    async fn list_users(&self, token: &str) -> Result<Vec<UserProfile>, OrderKitError> {
        self.record("users", token);
        next(&self.users, "users")
    }

    async fn register_push_token(
        &self,
        token: &str,
        device_token: &str,
    ) -> Result<(), OrderKitError> {
        self.record("update-fcm-token", &format!("{token}/{device_token}"));
        self.register_push
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn unregister_push_token(&self, token: &str) -> Result<(), OrderKitError> {
        self.record("remove-fcm-token", token);
        let delay = *self.unregister_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.unregister_push
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// Push platform handing out a fixed device token, or failing.
pub struct MockPushPlatform {
    pub device_token: Mutex<Result<String, String>>,
    pub delay: Mutex<Option<Duration>>,
}

impl Default for MockPushPlatform {
    fn default() -> Self {
        Self {
            device_token: Mutex::new(Ok("device-1".to_string())),
            delay: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PushPlatform for MockPushPlatform {
    async fn device_token(&self) -> Result<String, OrderKitError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.device_token
            .lock()
            .unwrap()
            .clone()
            .map_err(|reason| OrderKitError::InvalidInput {
                attribute: "device_token".to_string(),
                reason,
            })
    }
}
