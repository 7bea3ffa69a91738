use serde::{Deserialize, Serialize};

use portal_core::model::{ProfilePatch, UserProfile, UserSettings};

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest, Method};

pub const LOGIN: &str = "/api/v1/auth/login";
pub const REGISTER: &str = "/api/v1/auth/register";
pub const LOGOUT: &str = "/api/v1/auth/logout";
pub const REFRESH: &str = "/api/v1/auth/refresh";
pub const PROFILE: &str = "/api/v1/user/profile";
pub const PASSWORD: &str = "/api/v1/user/password";
pub const SETTINGS: &str = "/api/v1/user/settings";

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserProfile,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

pub async fn login(client: &ApiClient, request: &LoginRequest<'_>) -> Result<LoginResponse, ApiError> {
    client.post(LOGIN, request).await
}

pub async fn register(client: &ApiClient, request: &RegisterRequest) -> Result<(), ApiError> {
    client.post(REGISTER, request).await
}

/// Best-effort server-side logout using a credential the caller captured
/// before clearing the session.
pub async fn logout(client: &ApiClient, token: &str) -> Result<(), ApiError> {
    client
        .send(ApiRequest::new(Method::Post, LOGOUT).bearer(token).quiet())
        .await
}

/// Sent quiet; the caller signs out when the refresh token is refused.
pub async fn refresh(client: &ApiClient, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
    client
        .send(ApiRequest::new(Method::Post, REFRESH).json(&RefreshRequest { refresh_token })?.quiet())
        .await
}

pub async fn profile(client: &ApiClient) -> Result<UserProfile, ApiError> {
    client.get(PROFILE).await
}

pub async fn update_profile(client: &ApiClient, patch: &ProfilePatch) -> Result<UserProfile, ApiError> {
    client.put(PROFILE, patch).await
}

pub async fn change_password(
    client: &ApiClient,
    request: &ChangePasswordRequest<'_>,
) -> Result<(), ApiError> {
    client.put(PASSWORD, request).await
}

pub async fn update_settings(client: &ApiClient, settings: &UserSettings) -> Result<(), ApiError> {
    client.put(SETTINGS, settings).await
}
