use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::Deserialize;
use serde_json::json;

use super::{BackendApi, NewProfile, ProfileUpdate, UserProfile};
use crate::defaults::SessionConfig;
use crate::error::OrderKitError;
use crate::http_request::Request;

const LOGIN_PATH: &str = "/auth/login";
const SIGNUP_PATH: &str = "/auth/signup";
const ME_PATH: &str = "/auth/me";
const UPDATE_USER_PATH: &str = "/auth/updateUser";
const USERS_PATH: &str = "/auth/users";
const UPDATE_PUSH_TOKEN_PATH: &str = "/auth/update-fcm-token";
const REMOVE_PUSH_TOKEN_PATH: &str = "/auth/remove-fcm-token";

/// Response envelope shared by every backend endpoint.
#[derive(Deserialize, Debug)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    users: Option<Vec<UserProfile>>,
}

/// REST client for the ordering backend.
#[derive(Debug)]
pub struct HttpBackend {
    base_url: String,
    request: Request,
}

impl HttpBackend {
    /// Creates a client for `config.backend_url`.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            request: Request::new(config.request_timeout, config.transient_retries),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope, OrderKitError> {
        let url = self.url(path);
        let mut builder = self.request.authorized(method, &url, token)?;
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = self.request.handle(builder).await?;
        parse_envelope(path, url, response).await
    }

    async fn call_for_user(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> Result<UserProfile, OrderKitError> {
        self.call(method, path, token, body)
            .await?
            .user
            .ok_or_else(|| OrderKitError::SerializationError {
                error: format!("missing user in successful {path} response"),
            })
    }
}

/// Maps a response to the shared error taxonomy and parses its envelope.
async fn parse_envelope(
    path: &str,
    url: String,
    response: Response,
) -> Result<ApiEnvelope, OrderKitError> {
    let status = response.status().as_u16();
    match status {
        401 | 403 => return Err(OrderKitError::Unauthorized { url }),
        404 if path == ME_PATH => return Err(OrderKitError::ProfileNotFound),
        _ => {}
    }

    let text = response.text().await?;
    if status == 409 {
        let message = serde_json::from_str::<ApiEnvelope>(&text)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or_else(|| "resource already exists".to_string());
        return Err(OrderKitError::Conflict(message));
    }
    if !(200..300).contains(&status) {
        return Err(OrderKitError::NetworkError {
            url,
            status: Some(status),
            error: text,
        });
    }

    let envelope = serde_json::from_str::<ApiEnvelope>(&text).map_err(|e| {
        OrderKitError::SerializationError {
            error: format!("failed to parse {path} response: {e}"),
        }
    })?;
    if !envelope.success {
        return Err(OrderKitError::NetworkError {
            url,
            status: Some(status),
            error: envelope.message.unwrap_or_default(),
        });
    }
    Ok(envelope)
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, OrderKitError> {
        self.call_for_user(Method::GET, ME_PATH, token, None).await
    }

    async fn create_profile(
        &self,
        token: &str,
        profile: &NewProfile,
    ) -> Result<UserProfile, OrderKitError> {
        let body = serde_json::to_value(profile)?;
        self.call_for_user(Method::POST, SIGNUP_PATH, token, Some(body))
            .await
    }

    async fn login(&self, token: &str) -> Result<UserProfile, OrderKitError> {
        self.call_for_user(Method::POST, LOGIN_PATH, token, Some(json!({})))
            .await
    }

    async fn update_profile(
        &self,
        token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, OrderKitError> {
        let body = serde_json::to_value(update)?;
        self.call_for_user(Method::PUT, UPDATE_USER_PATH, token, Some(body))
            .await
    }

    async fn list_users(&self, token: &str) -> Result<Vec<UserProfile>, OrderKitError> {
        Ok(self
            .call(Method::GET, USERS_PATH, token, None)
            .await?
            .users
            .unwrap_or_default())
    }

    async fn register_push_token(
        &self,
        token: &str,
        device_token: &str,
    ) -> Result<(), OrderKitError> {
        self.call(
            Method::POST,
            UPDATE_PUSH_TOKEN_PATH,
            token,
            Some(json!({ "fcmToken": device_token })),
        )
        .await?;
        Ok(())
    }

    async fn unregister_push_token(&self, token: &str) -> Result<(), OrderKitError> {
        self.call(Method::DELETE, REMOVE_PUSH_TOKEN_PATH, token, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
impl HttpBackend {
    /// Client for a mock server, with `retries` transient retries.
    pub(crate) fn with_base_url(base_url: &str, retries: u32) -> Self {
        Self {
            base_url: base_url.to_string(),
            request: Request::new(std::time::Duration::from_secs(5), retries),
        }
    }
}
