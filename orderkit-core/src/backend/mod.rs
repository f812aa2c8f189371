//! Ordering backend API.
//!
//! [`BackendApi`] is the seam the session layer and the push coordinator call
//! through; [`HttpBackend`] is its REST implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OrderKitError;

mod http;

pub use http::HttpBackend;

/// Role of a backend user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular ordering customer.
    Customer,
    /// Store administrator.
    Admin,
}

/// Whether an account may use the app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account in good standing.
    #[default]
    Active,
    /// Deactivated by an administrator; sign-in is refused.
    Inactive,
}

/// A user record as held by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Backend user id (`_id` in older responses).
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Sign-in email, also the link to the identity provider principal.
    pub email: String,
    /// Contact phone number, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Authorization role.
    pub role: UserRole,
    /// Account status; missing means active.
    #[serde(default)]
    pub status: AccountStatus,
}

impl UserProfile {
    /// Whether the account has been deactivated.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.status == AccountStatus::Inactive
    }
}

/// Body of a profile creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    /// Display name.
    pub name: String,
    /// Email of the signed-in principal.
    pub email: String,
    /// Contact phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Partial profile update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New contact phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Operations of the ordering backend. Every call carries the session's
/// bearer token.
///
/// Errors follow one mapping for all implementations: a rejected token is
/// [`OrderKitError::Unauthorized`], a missing profile is
/// [`OrderKitError::ProfileNotFound`], an already-existing resource is
/// [`OrderKitError::Conflict`], anything else is a network error.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Profile of the authenticated identity (`GET /auth/me`).
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, OrderKitError>;

    /// Creates the profile of the authenticated identity (`POST /auth/signup`).
    async fn create_profile(
        &self,
        token: &str,
        profile: &NewProfile,
    ) -> Result<UserProfile, OrderKitError>;

    /// Establishes a backend session for an existing profile (`POST /auth/login`).
    async fn login(&self, token: &str) -> Result<UserProfile, OrderKitError>;

    /// Updates the authenticated user's profile (`PUT /auth/updateUser`).
    async fn update_profile(
        &self,
        token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, OrderKitError>;

    /// All users; admin only (`GET /auth/users`).
    async fn list_users(&self, token: &str) -> Result<Vec<UserProfile>, OrderKitError>;

    /// Associates a device push token with the user (`POST /auth/update-fcm-token`).
    async fn register_push_token(
        &self,
        token: &str,
        device_token: &str,
    ) -> Result<(), OrderKitError>;

    /// Removes the user's device push token (`DELETE /auth/remove-fcm-token`).
    async fn unregister_push_token(&self, token: &str) -> Result<(), OrderKitError>;
}
