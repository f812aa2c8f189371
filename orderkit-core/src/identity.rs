//! Identity provider seam.
//!
//! The hosted identity service authenticates principal credentials
//! (email/password) and issues short-lived ID tokens. The backend accepts those
//! ID tokens as bearer credentials.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::OrderKitError;

/// Email/password pair presented to the identity provider.
#[derive(Debug, Clone)]
pub struct PrincipalCredentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: SecretString,
}

impl PrincipalCredentials {
    /// Builds credentials, rejecting blank values before any provider call.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the email or password is empty.
    pub fn new(email: &str, password: impl Into<String>) -> Result<Self, OrderKitError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(OrderKitError::InvalidInput {
                attribute: "email".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let password: String = password.into();
        if password.is_empty() {
            return Err(OrderKitError::InvalidInput {
                attribute: "password".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(Self {
            email: email.to_string(),
            password: SecretString::from(password),
        })
    }
}

/// A bearer token issued by the identity provider.
#[derive(Debug, Clone)]
pub struct IdToken {
    value: SecretString,
    expires_at: Option<u64>,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<u64>,
}

impl IdToken {
    /// Wraps a raw token, reading its expiry from the `exp` claim when the
    /// token is a JWT.
    #[must_use]
    pub fn from_jwt(value: impl Into<String>) -> Self {
        let value: String = value.into();
        let expires_at = decode_exp(&value);
        Self {
            value: SecretString::from(value),
            expires_at,
        }
    }

    /// Wraps a raw token with a known expiry (unix seconds).
    #[must_use]
    pub fn with_expiry(value: impl Into<String>, expires_at: Option<u64>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at,
        }
    }

    /// The raw token, for the `Authorization` header or the credential store.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Expiry in unix seconds, if known.
    #[must_use]
    pub const fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Whether the token expires within `skew_secs` of `now_secs`. Tokens
    /// without a known expiry never count as expired.
    #[must_use]
    pub fn is_expired_at(&self, now_secs: u64, skew_secs: u64) -> bool {
        self.expires_at
            .is_some_and(|exp| now_secs.saturating_add(skew_secs) >= exp)
    }
}

fn decode_exp(token: &str) -> Option<u64> {
    let claims = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<ExpiryClaim>(&bytes).ok()?.exp
}

/// Seconds since the unix epoch; 0 if the clock is before it.
pub(crate) fn current_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// External identity service.
///
/// Implementations keep the provider-side signed-in user; `id_token` reads
/// from it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Signs in an existing principal.
    ///
    /// Bad credentials are reported as [`OrderKitError::InvalidCredentials`].
    async fn sign_in(&self, credentials: &PrincipalCredentials) -> Result<(), OrderKitError>;

    /// Creates a new principal and signs it in.
    async fn sign_up(&self, credentials: &PrincipalCredentials) -> Result<(), OrderKitError>;

    /// Current ID token of the signed-in principal; `force_refresh` asks the
    /// provider to mint a fresh one.
    async fn id_token(&self, force_refresh: bool) -> Result<IdToken, OrderKitError>;

    /// Signs the principal out of the provider.
    async fn sign_out(&self) -> Result<(), OrderKitError>;

    /// Whether `token` should be refreshed before use.
    fn is_expired(&self, token: &IdToken, now_secs: u64, skew_secs: u64) -> bool {
        token.is_expired_at(now_secs, skew_secs)
    }
}
