use axum::{extract::State, http::HeaderMap, Json};
use gatehouse_auth::VerificationStatus;
use gatehouse_database::{UserPreferences, UserRole};
use gatehouse_mailer::templates;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    routes::auth::{dispatch_verification_email, MessageResponse},
    util::require_bearer,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct PreferencesResponse {
    pub theme: String,
    pub language: String,
    pub notifications_enabled: bool,
    pub email_notifications: bool,
    pub timezone: String,
}

impl From<UserPreferences> for PreferencesResponse {
    fn from(value: UserPreferences) -> Self {
        Self {
            theme: value.theme,
            language: value.language,
            notifications_enabled: value.notifications_enabled,
            email_notifications: value.email_notifications,
            timezone: value.timezone,
        }
    }
}

/// Partial update; absent fields keep their stored values.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub notifications_enabled: Option<bool>,
    #[serde(default)]
    pub email_notifications: Option<bool>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationStatusResponse {
    pub email: String,
    pub verified: bool,
    pub pending: bool,
    pub cooldown_remaining_seconds: u64,
}

impl From<VerificationStatus> for VerificationStatusResponse {
    fn from(value: VerificationStatus) -> Self {
        Self {
            email: value.email,
            verified: value.verified,
            pending: value.pending,
            cooldown_remaining_seconds: value.cooldown_remaining_seconds,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "Settings",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Stored preferences, created on first read", body = PreferencesResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;

    let settings = state.settings().get_or_create(user.id).await?;

    Ok(Json(PreferencesResponse::from(settings.preferences)))
}

#[utoipa::path(
    put,
    path = "/api/settings",
    tag = "Settings",
    security(("bearerAuth" = [])),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Preferences merged and stored", body = PreferencesResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;

    let mut preferences = state.settings().get_or_create(user.id).await?.preferences;
    if let Some(theme) = payload.theme {
        preferences.theme = theme;
    }
    if let Some(language) = payload.language {
        preferences.language = language;
    }
    if let Some(notifications_enabled) = payload.notifications_enabled {
        preferences.notifications_enabled = notifications_enabled;
    }
    if let Some(email_notifications) = payload.email_notifications {
        preferences.email_notifications = email_notifications;
    }
    if let Some(timezone) = payload.timezone {
        preferences.timezone = timezone;
    }

    let updated = state.settings().update(user.id, &preferences).await?;

    Ok(Json(PreferencesResponse::from(updated.preferences)))
}

#[utoipa::path(
    delete,
    path = "/api/settings",
    tag = "Settings",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Preferences reset to defaults", body = PreferencesResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn reset_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;

    let settings = state.settings().reset_to_default(user.id).await?;

    Ok(Json(PreferencesResponse::from(settings.preferences)))
}

#[utoipa::path(
    get,
    path = "/api/settings/email-verification",
    tag = "Settings",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Verification state and resend cooldown", body = VerificationStatusResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn verification_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<VerificationStatusResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;

    let status = state.authenticator().verification_status(user.id).await?;

    Ok(Json(VerificationStatusResponse::from(status)))
}

#[utoipa::path(
    post,
    path = "/api/settings/email-verification",
    operation_id = "settings_resend_verification",
    tag = "Settings",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Verification email re-sent", body = MessageResponse),
        (status = 400, description = "Email already verified", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 429, description = "Inside the resend cooldown", body = crate::error::ErrorResponse)
    )
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;

    let resend = state.authenticator().resend_verification(user.id).await?;
    dispatch_verification_email(&state, &resend.user, &resend.token).await;

    Ok(Json(MessageResponse {
        message: "Verification email sent.".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/settings/test-smtp",
    tag = "Settings",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Test email delivered to the admin's address", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = crate::error::ErrorResponse),
        (status = 502, description = "SMTP delivery failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn test_smtp(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;

    if user.role != UserRole::Admin {
        return Err(ApiError::forbidden("administrator access required"));
    }

    // Unlike the account flows, the whole point here is to surface failure.
    let email = templates::smtp_probe(&user.email);
    state.mailer().send(&email).await?;

    Ok(Json(MessageResponse {
        message: format!("Test email sent to {}.", user.email),
    }))
}
